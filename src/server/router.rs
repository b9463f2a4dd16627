use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::core::config::ServerSettings;
use crate::server::handlers::{config, health, page, sessions};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

/// Creates the application router: chat page, status and inspection
/// endpoints, and the `/ws` chat socket, behind CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.settings.server);
    Router::new()
        .route("/", get(page::index))
        .route("/health", get(health::health))
        .route("/api/status", get(health::get_status))
        .route("/api/config", get(config::get_config))
        .route("/api/sessions", get(sessions::list_sessions))
        .route("/api/sessions/:session_id", get(sessions::get_session))
        .route("/ws", get(ws_handler))
        .with_state(state)
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(server: &ServerSettings) -> CorsLayer {
    let allowed_origins = allowed_origins(server)
        .into_iter()
        .filter_map(|origin| HeaderValue::from_str(&origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}

/// Configured origins, or the local addresses the chat page is served from.
pub fn allowed_origins(server: &ServerSettings) -> Vec<String> {
    let origins = server
        .allowed_origins
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .map(|item| item.to_string())
        .collect::<Vec<_>>();

    if origins.is_empty() {
        return default_local_origins(server.port);
    }

    origins
}

fn default_local_origins(port: u16) -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "http://127.0.0.1".to_string(),
        format!("http://localhost:{}", port),
        format!("http://127.0.0.1:{}", port),
    ]
}
