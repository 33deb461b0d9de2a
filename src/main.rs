#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

mod automation;
mod cli;
mod config;
mod db;
mod discord;
mod utils;
mod web;

use automation::{ActionExecutor, AutomationRunner, AutomationSource, ExecutorSettings, RunnerSettings};
use cli::Cli;
use config::Config;
use discord::{DiscordApi, DiscordClient};
use web::WebServer;
use web::metrics::Metrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(Config::load_from_file(&cli.config)?);
    utils::logging::init_tracing(&config.logging)?;
    Metrics::init();
    info!("discord automations starting up");

    let db_manager = Arc::new(db::DatabaseManager::new(&config.database).await?);
    db_manager.migrate().await?;
    if cli.migrate_only {
        info!("migrations applied, exiting");
        return Ok(());
    }

    let discord_client = Arc::new(DiscordClient::new(&config.discord));
    let executor = ActionExecutor::new(
        discord_client.clone() as Arc<dyn DiscordApi>,
        ExecutorSettings {
            delete_pacing: Duration::from_millis(config.engine.delete_pacing_ms),
            message_fetch_limit: config.engine.message_fetch_limit,
            embed_color: config.engine.embed_color,
        },
    );
    let runner = Arc::new(AutomationRunner::new(
        db_manager.clone() as Arc<dyn AutomationSource>,
        executor,
        RunnerSettings {
            ignore_bot_events: config.engine.ignore_bot_events,
            record_events: config.engine.record_events,
        },
    ));
    discord_client.set_runner(runner).await;

    if config.engine.event_log_retention_days > 0 {
        spawn_event_log_retention(db_manager.clone(), config.engine.event_log_retention_days);
    }

    let web_handle = if config.web.enabled {
        let web_server = WebServer::new(config.clone(), db_manager.clone());
        Some(tokio::spawn(async move {
            if let Err(e) = web_server.start().await {
                error!("web server error: {}", e);
            }
        }))
    } else {
        None
    };

    discord_client.start().await?;

    match web_handle {
        Some(web_handle) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {},
                _ = web_handle => error!("web server exited"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    info!("discord automations shutting down");
    discord_client.stop().await?;
    Ok(())
}

const EVENT_LOG_PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn spawn_event_log_retention(db_manager: Arc<db::DatabaseManager>, retention_days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(EVENT_LOG_PRUNE_INTERVAL);
        loop {
            interval.tick().await;
            match db_manager.prune_event_logs(retention_days).await {
                Ok(0) => {}
                Ok(pruned) => info!(pruned, retention_days, "pruned old event logs"),
                Err(e) => warn!("failed to prune event logs: {}", e),
            }
        }
    });
}
