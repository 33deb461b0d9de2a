use salvo::prelude::*;
use serde_json::json;

use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render(Json(json!({
        "status": "ok",
        "uptime_seconds": web_state().started_at.elapsed().as_secs(),
    })));
}

#[handler]
pub async fn get_status(res: &mut Response) {
    let state = web_state();
    res.render(Json(json!({
        "status": "running",
        "database": format!("{:?}", state.db_manager.db_type()),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    })));
}
