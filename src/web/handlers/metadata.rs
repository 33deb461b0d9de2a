use salvo::prelude::*;
use serde_json::{Value, json};

use crate::automation::metadata::{
    ACTION_TYPES, AUTOMATION_USER_SOURCES, COMMAND_USER_SOURCES, EVENT_CATEGORIES, EVENT_TYPES,
    FILTER_TYPES, TEMPLATE_VARIABLES, filters_for_event,
};

/// Everything a rule editor needs to offer valid choices.
pub fn metadata_document() -> Value {
    let template_variables: Vec<Value> = TEMPLATE_VARIABLES
        .iter()
        .map(|(key, description)| json!({ "key": key, "description": description }))
        .collect();

    json!({
        "event_categories": EVENT_CATEGORIES,
        "event_types": EVENT_TYPES,
        "filter_types": FILTER_TYPES,
        "action_types": ACTION_TYPES,
        "template_variables": template_variables,
        "user_sources": {
            "automation": AUTOMATION_USER_SOURCES,
            "command": COMMAND_USER_SOURCES,
        },
    })
}

#[handler]
pub async fn get_metadata(res: &mut Response) {
    res.render(Json(metadata_document()));
}

#[handler]
pub async fn get_event_filters(req: &mut Request, res: &mut Response) {
    let event_type = req.param::<String>("event_type").unwrap_or_default();
    let filters = filters_for_event(&event_type);
    res.render(Json(json!({
        "event_type": event_type,
        "filters": filters,
    })));
}
