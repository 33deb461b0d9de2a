use chrono::{DateTime, Duration, Utc};
use salvo::prelude::*;
use serde_json::json;

use super::render_error;
use crate::db::{EventLogQuery, GuildSettings};
use crate::web::web_state;

const MAX_EVENT_PAGE: i64 = 100;

fn parse_time(name: &str, raw: Option<String>) -> Result<Option<DateTime<Utc>>, String> {
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|_| format!("{name} must be an RFC 3339 timestamp"))
    })
    .transpose()
}

/// Raw query parameters of the event log listing.
#[derive(Debug, Default)]
pub struct EventListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub category: Option<String>,
    pub event_type: Option<String>,
    pub actor_id: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub search: Option<String>,
}

impl EventListParams {
    fn from_request(req: &Request) -> Self {
        Self {
            limit: req.query::<i64>("limit"),
            offset: req.query::<i64>("offset"),
            category: req.query::<String>("category"),
            event_type: req.query::<String>("event_type"),
            actor_id: req.query::<String>("actor_id"),
            start: req.query::<String>("start"),
            end: req.query::<String>("end"),
            search: req.query::<String>("search"),
        }
    }

    pub fn into_query(self) -> Result<EventLogQuery, String> {
        let non_empty = |value: Option<String>| value.filter(|value| !value.is_empty());
        Ok(EventLogQuery {
            limit: self.limit.unwrap_or(50).clamp(1, MAX_EVENT_PAGE),
            offset: self.offset.unwrap_or(0).max(0),
            category: non_empty(self.category),
            event_type: non_empty(self.event_type),
            actor_id: non_empty(self.actor_id),
            start: parse_time("start", self.start)?,
            end: parse_time("end", self.end)?,
            search: non_empty(self.search),
        })
    }
}

fn stats_window() -> DateTime<Utc> {
    Utc::now() - Duration::hours(24)
}

#[handler]
pub async fn list_events(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };
    let query = match EventListParams::from_request(req).into_query() {
        Ok(query) => query,
        Err(message) => {
            render_error(res, StatusCode::BAD_REQUEST, &message);
            return;
        }
    };
    let store = web_state().db_manager.event_log_store();

    let page = match store.list_event_logs(&guild_id, &query).await {
        Ok(page) => page,
        Err(err) => {
            render_error(
                res,
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("database error: {}", err),
            );
            return;
        }
    };

    let mut body = json!({
        "events": page.items,
        "total": page.total,
        "limit": query.limit,
        "offset": query.offset,
        "hasMore": page.has_more(query.offset),
    });
    if req.query::<bool>("stats").unwrap_or(false) {
        match store.event_log_stats(&guild_id, stats_window()).await {
            Ok(stats) => body["stats"] = json!(stats),
            Err(err) => {
                render_error(
                    res,
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &format!("database error: {}", err),
                );
                return;
            }
        }
    }
    res.render(Json(body));
}

#[handler]
pub async fn event_stats(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };

    match web_state()
        .db_manager
        .event_log_store()
        .event_log_stats(&guild_id, stats_window())
        .await
    {
        Ok(stats) => res.render(Json(json!({ "stats": stats }))),
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn prune_events(req: &mut Request, res: &mut Response) {
    let days = req.query::<u32>("older_than_days").unwrap_or(30);
    if days == 0 {
        render_error(res, StatusCode::BAD_REQUEST, "older_than_days must be positive");
        return;
    }

    match web_state().db_manager.prune_event_logs(days).await {
        Ok(deleted) => {
            tracing::info!(deleted, days, "pruned event logs on request");
            res.render(Json(json!({ "ok": true, "deleted": deleted, "olderThanDays": days })));
        }
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn get_settings(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };

    match web_state()
        .db_manager
        .guild_settings_store()
        .get_guild_settings(&guild_id)
        .await
    {
        Ok(settings) => {
            let settings = settings.unwrap_or_else(|| GuildSettings::new(guild_id));
            res.render(Json(json!({ "settings": settings })));
        }
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn put_settings(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };
    let mut settings = match req.parse_json::<GuildSettings>().await {
        Ok(settings) => settings,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid settings body: {}", err));
            return;
        }
    };
    settings.guild_id = guild_id;

    match web_state()
        .db_manager
        .guild_settings_store()
        .upsert_guild_settings(&settings)
        .await
    {
        Ok(saved) => res.render(Json(json!({ "settings": saved }))),
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_clamp_and_drop_blanks() {
        let query = EventListParams {
            limit: Some(500),
            offset: Some(-1),
            category: Some(String::new()),
            event_type: Some("MEMBER_JOIN".into()),
            ..EventListParams::default()
        }
        .into_query()
        .unwrap();

        assert_eq!(query.limit, MAX_EVENT_PAGE);
        assert_eq!(query.offset, 0);
        assert_eq!(query.category, None);
        assert_eq!(query.event_type.as_deref(), Some("MEMBER_JOIN"));

        let defaults = EventListParams::default().into_query().unwrap();
        assert_eq!(defaults, EventLogQuery::default());
    }

    #[test]
    fn time_bounds_must_be_rfc3339() {
        let query = EventListParams {
            start: Some("2024-05-01T00:00:00Z".into()),
            ..EventListParams::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.start.map(|at| at.timestamp()), Some(1_714_521_600));

        let bad = EventListParams {
            end: Some("yesterday".into()),
            ..EventListParams::default()
        }
        .into_query();
        assert_eq!(bad, Err("end must be an RFC 3339 timestamp".to_string()));
    }

    #[test]
    fn settings_bodies_default_to_logging_everything() {
        let settings: GuildSettings =
            serde_json::from_str(r#"{"excluded_categories":["voice"]}"#).unwrap();
        assert!(settings.logging_enabled);
        assert!(settings.excluded_channels.is_empty());
        assert_eq!(settings.excluded_categories, vec!["voice".to_string()]);
    }
}
