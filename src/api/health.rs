use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status and a non-secret config summary.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "iaedu-adapter is running",
        "model": state.model_name(),
        "upstream_host": state.upstream.endpoint().host_str(),
    }))
}
