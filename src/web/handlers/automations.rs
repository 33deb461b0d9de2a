use std::str::FromStr;

use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;

use super::render_error;
use crate::automation::ActionType;
use crate::automation::metadata::EVENT_TYPES;
use crate::db::{ExecutionLogQuery, NewAutomation};
use crate::web::web_state;

#[derive(Debug, Deserialize)]
struct EnabledUpdate {
    enabled: bool,
}

/// Checks a submitted rule before it is stored.
pub fn validate_new_automation(automation: &NewAutomation) -> Result<(), String> {
    if automation.name.trim().is_empty() {
        return Err("name must not be empty".to_string());
    }
    if automation.trigger_events.is_empty() {
        return Err("at least one trigger event is required".to_string());
    }
    if let Some(unknown) = automation
        .trigger_events
        .iter()
        .find(|event| !EVENT_TYPES.iter().any(|info| info.event_type == event.as_str()))
    {
        return Err(format!("unknown trigger event: {unknown}"));
    }
    if automation.enabled && automation.actions.is_empty() {
        return Err("enabled automations need at least one action".to_string());
    }
    for action in &automation.actions {
        ActionType::from_str(&action.action_type).map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[handler]
pub async fn list_automations(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };

    match web_state()
        .db_manager
        .automation_store()
        .list_automations(&guild_id)
        .await
    {
        Ok(automations) => {
            res.render(Json(json!({
                "automations": automations,
                "count": automations.len(),
            })));
        }
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn create_automation(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };
    let mut automation = match req.parse_json::<NewAutomation>().await {
        Ok(automation) => automation,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid automation body: {}", err),
            );
            return;
        }
    };
    automation.guild_id = guild_id;

    if let Err(message) = validate_new_automation(&automation) {
        render_error(res, StatusCode::BAD_REQUEST, &message);
        return;
    }

    match web_state()
        .db_manager
        .automation_store()
        .create_automation(&automation)
        .await
    {
        Ok(created) => {
            tracing::info!(
                automation_id = created.id,
                guild_id = %created.guild_id,
                "created automation {}",
                created.name
            );
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "automation": created })));
        }
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn get_automation(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid automation id");
        return;
    };

    match web_state()
        .db_manager
        .automation_store()
        .get_automation(id)
        .await
    {
        Ok(Some(automation)) => res.render(Json(json!({ "automation": automation }))),
        Ok(None) => render_error(res, StatusCode::NOT_FOUND, "automation not found"),
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn update_automation(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid automation id");
        return;
    };
    // The stored guild is kept whatever the body says.
    let automation = match req.parse_json::<NewAutomation>().await {
        Ok(automation) => automation,
        Err(err) => {
            render_error(
                res,
                StatusCode::BAD_REQUEST,
                &format!("invalid automation body: {}", err),
            );
            return;
        }
    };

    if let Err(message) = validate_new_automation(&automation) {
        render_error(res, StatusCode::BAD_REQUEST, &message);
        return;
    }

    match web_state()
        .db_manager
        .automation_store()
        .update_automation(id, &automation)
        .await
    {
        Ok(Some(updated)) => {
            tracing::info!(automation_id = id, "updated automation {}", updated.name);
            res.render(Json(json!({ "automation": updated })));
        }
        Ok(None) => render_error(res, StatusCode::NOT_FOUND, "automation not found"),
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn set_enabled(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid automation id");
        return;
    };
    let update = match req.parse_json::<EnabledUpdate>().await {
        Ok(update) => update,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid body: {}", err));
            return;
        }
    };

    match web_state()
        .db_manager
        .automation_store()
        .set_enabled(id, update.enabled)
        .await
    {
        Ok(true) => res.render(Json(json!({ "ok": true, "id": id, "enabled": update.enabled }))),
        Ok(false) => render_error(res, StatusCode::NOT_FOUND, "automation not found"),
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn delete_automation(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid automation id");
        return;
    };

    match web_state()
        .db_manager
        .automation_store()
        .delete_automation(id)
        .await
    {
        Ok(true) => {
            tracing::info!(automation_id = id, "deleted automation");
            res.render(Json(json!({ "ok": true, "id": id })));
        }
        Ok(false) => render_error(res, StatusCode::NOT_FOUND, "automation not found"),
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[handler]
pub async fn list_logs(req: &mut Request, res: &mut Response) {
    let Some(id) = req.param::<i64>("id") else {
        render_error(res, StatusCode::BAD_REQUEST, "invalid automation id");
        return;
    };
    let limit = req.query::<i64>("limit").unwrap_or(50).clamp(1, 500);

    match web_state()
        .db_manager
        .execution_log_store()
        .list_execution_logs(id, limit)
        .await
    {
        Ok(logs) => {
            res.render(Json(json!({
                "logs": logs,
                "count": logs.len(),
                "limit": limit,
            })));
        }
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

/// Builds a guild log query from raw parameters, clamping the page size.
pub fn execution_log_query(
    limit: Option<i64>,
    offset: Option<i64>,
    automation_id: Option<i64>,
    success: Option<bool>,
) -> ExecutionLogQuery {
    ExecutionLogQuery {
        limit: limit.unwrap_or(50).clamp(1, 100),
        offset: offset.unwrap_or(0).max(0),
        automation_id,
        success,
    }
}

#[handler]
pub async fn list_guild_logs(req: &mut Request, res: &mut Response) {
    let Some(guild_id) = req.param::<String>("guild_id") else {
        render_error(res, StatusCode::BAD_REQUEST, "missing guild_id");
        return;
    };
    let query = execution_log_query(
        req.query::<i64>("limit"),
        req.query::<i64>("offset"),
        req.query::<i64>("automation_id"),
        req.query::<bool>("success"),
    );

    match web_state()
        .db_manager
        .execution_log_store()
        .list_guild_execution_logs(&guild_id, &query)
        .await
    {
        Ok(page) => {
            res.render(Json(json!({
                "hasMore": page.has_more(query.offset),
                "logs": page.items,
                "total": page.total,
                "limit": query.limit,
                "offset": query.offset,
            })));
        }
        Err(err) => render_error(
            res,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("database error: {}", err),
        ),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;
    use crate::automation::ActionSpec;

    fn automation() -> NewAutomation {
        NewAutomation {
            guild_id: "1".to_string(),
            name: "Welcome".to_string(),
            enabled: true,
            trigger_events: vec!["MEMBER_JOIN".to_string()],
            actions: vec![ActionSpec::new("SEND_MESSAGE", Map::new())],
            ..Default::default()
        }
    }

    #[test]
    fn accepts_known_events_and_actions() {
        assert_eq!(validate_new_automation(&automation()), Ok(()));
    }

    #[test]
    fn rejects_blank_name_and_missing_triggers() {
        let mut blank = automation();
        blank.name = "  ".to_string();
        assert!(validate_new_automation(&blank).is_err());

        let mut untriggered = automation();
        untriggered.trigger_events.clear();
        assert_eq!(
            validate_new_automation(&untriggered),
            Err("at least one trigger event is required".to_string())
        );
    }

    #[test]
    fn rejects_unknown_vocabulary() {
        let mut bad_event = automation();
        bad_event.trigger_events.push("MEMBER_DANCE".to_string());
        assert_eq!(
            validate_new_automation(&bad_event),
            Err("unknown trigger event: MEMBER_DANCE".to_string())
        );

        let mut bad_action = automation();
        bad_action.actions.push(ActionSpec::new("EXPLODE", Map::new()));
        assert!(validate_new_automation(&bad_action).is_err());
    }

    #[test]
    fn enabled_rules_need_an_action() {
        let mut empty = automation();
        empty.actions.clear();
        assert_eq!(
            validate_new_automation(&empty),
            Err("enabled automations need at least one action".to_string())
        );

        empty.enabled = false;
        assert_eq!(validate_new_automation(&empty), Ok(()));
    }

    #[test]
    fn guild_log_queries_are_clamped() {
        let query = execution_log_query(Some(1_000), Some(-5), Some(3), Some(false));
        assert_eq!(query.limit, 100);
        assert_eq!(query.offset, 0);
        assert_eq!(query.automation_id, Some(3));
        assert_eq!(query.success, Some(false));

        let defaults = execution_log_query(None, None, None, None);
        assert_eq!(defaults, ExecutionLogQuery::default());
    }

    #[test]
    fn enabled_update_parses() {
        let update: EnabledUpdate = serde_json::from_str(r#"{"enabled":false}"#).unwrap();
        assert!(!update.enabled);
    }
}
