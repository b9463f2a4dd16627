use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let index = state.chat.retriever().index();
    let search = state.chat.search();
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0);

    Ok(Json(json!({
        "index": {
            "chunks": index.len(),
            "dimension": index.dimension(),
            "embeddingModel": index.model_id(),
            "builtAt": index.built_at()
        },
        "search": {
            "enabled": search.is_enabled(),
            "provider": search.provider().name(),
            "maxResults": search.max_results()
        },
        "llm": {
            "model": state.chat.generator().model()
        },
        "activeSessions": state.sessions.len().await,
        "uptimeSecs": uptime_secs
    })))
}
