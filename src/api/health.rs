use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

#[must_use]
pub fn health_handler(state: &AppState) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "geminify-rs",
        "upstream": state.config.upstream.base_url,
    }))
}
