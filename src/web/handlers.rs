pub mod automations;
pub mod events;
pub mod health;
pub mod metadata;

use salvo::prelude::*;
use serde_json::json;

pub(crate) fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}
