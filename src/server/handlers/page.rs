use axum::response::{Html, IntoResponse};

const CHAT_PAGE: &str = include_str!("../../../static/index.html");

pub async fn index() -> impl IntoResponse {
    Html(CHAT_PAGE)
}
