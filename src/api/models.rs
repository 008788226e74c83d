use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::protocol::openai_chat::{ModelEntry, ModelList};
use crate::state::AppState;
use crate::util::unix_now_millis;

/// List the single model this adapter exposes, in `OpenAI` format.
#[must_use]
pub fn handler(State(state): State<Arc<AppState>>) -> Response {
    Json(model_list(&state)).into_response()
}

#[must_use]
pub fn model_list(state: &AppState) -> ModelList {
    ModelList {
        object: "list".to_string(),
        data: vec![ModelEntry {
            id: state.config.adapter.model_name.clone(),
            object: "model".to_string(),
            created: unix_now_millis(),
            owned_by: state.config.adapter.owned_by.clone(),
        }],
    }
}
