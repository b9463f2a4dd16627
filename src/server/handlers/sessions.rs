use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.sessions.list().await;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session not found".to_string()))?;

    Ok(Json(json!({ "session": session })))
}
