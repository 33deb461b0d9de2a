use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use tracing::info;

use crate::config::Config;
use crate::db::DatabaseManager;

pub mod handlers;
pub mod metrics;

use self::handlers::{automations, events, health, metadata};

#[derive(Clone)]
pub struct WebState {
    pub db_manager: Arc<DatabaseManager>,
    pub started_at: Instant,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<Config>,
}

impl WebServer {
    pub fn new(config: Arc<Config>, db_manager: Arc<DatabaseManager>) -> Self {
        let _ = WEB_STATE.set(WebState {
            db_manager,
            started_at: Instant::now(),
        });

        Self { config }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.web.bind_address, self.config.web.port);
        info!("Starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr).bind().await;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health::health_check))
        .push(Router::with_path("status").get(health::get_status))
        .push(Router::with_path("metrics").get(metrics::metrics_endpoint))
        .push(
            Router::with_path("metadata")
                .get(metadata::get_metadata)
                .push(Router::with_path("filters/{event_type}").get(metadata::get_event_filters)),
        )
        .push(
            Router::with_path("guilds/{guild_id}/automations")
                .get(automations::list_automations)
                .post(automations::create_automation),
        )
        .push(Router::with_path("guilds/{guild_id}/automation-logs").get(automations::list_guild_logs))
        .push(
            Router::with_path("guilds/{guild_id}/events")
                .get(events::list_events)
                .push(Router::with_path("stats").get(events::event_stats)),
        )
        .push(
            Router::with_path("guilds/{guild_id}/settings")
                .get(events::get_settings)
                .put(events::put_settings),
        )
        .push(Router::with_path("events").delete(events::prune_events))
        .push(
            Router::with_path("automations/{id}")
                .get(automations::get_automation)
                .put(automations::update_automation)
                .delete(automations::delete_automation)
                .push(Router::with_path("enabled").put(automations::set_enabled))
                .push(Router::with_path("logs").get(automations::list_logs)),
        )
}
