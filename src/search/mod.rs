//! Web search augmentation.
//!
//! [`WebSearch::search`] reports every failure; the chat pipeline uses
//! [`WebSearch::search_or_empty`], which turns any failure into "no web
//! results" so a turn never fails because of the search provider.

mod providers;
mod rate_limiter;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::core::config::{SearchProviderKind, SearchSettings};

pub use providers::default_endpoint;
pub use rate_limiter::SearchRateLimiter;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search provider '{0}' requires an API key (set SEARCH_API_KEY)")]
    MissingApiKey(&'static str),
    #[error("search rate limit exceeded")]
    RateLimited,
    #[error("search request timed out")]
    Timeout,
    #[error("search request failed: {0}")]
    Network(String),
    #[error("search provider returned HTTP {0}")]
    Status(u16),
    #[error("could not parse search response: {0}")]
    Parse(String),
}

pub struct WebSearch {
    settings: SearchSettings,
    client: reqwest::Client,
    limiter: SearchRateLimiter,
}

impl WebSearch {
    pub fn new(settings: SearchSettings) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .user_agent(concat!("aivancity-assistant/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SearchError::Network(e.to_string()))?;
        let limiter = SearchRateLimiter::new(settings.rate_limit_per_minute);

        Ok(Self {
            settings,
            client,
            limiter,
        })
    }

    pub fn disabled() -> Self {
        Self {
            settings: SearchSettings {
                enabled: false,
                ..SearchSettings::default()
            },
            client: reqwest::Client::new(),
            limiter: SearchRateLimiter::new(1),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn provider(&self) -> SearchProviderKind {
        self.settings.provider
    }

    pub fn max_results(&self) -> usize {
        self.settings.max_results
    }

    /// Up to `n` results from the configured provider.
    pub async fn search(&self, query: &str, n: usize) -> Result<Vec<WebResult>, SearchError> {
        if !self.settings.enabled || n == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let provider = self.settings.provider;
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty());
        if provider.requires_api_key() && api_key.is_none() {
            return Err(SearchError::MissingApiKey(provider.name()));
        }

        self.limiter.check()?;

        let endpoint = self
            .settings
            .endpoint
            .as_deref()
            .unwrap_or_else(|| default_endpoint(provider));
        let request = providers::ProviderRequest {
            provider,
            endpoint,
            query,
            count: n,
            api_key,
            engine_id: self.settings.engine_id.as_deref(),
        };

        let response = request.build(&self.client).send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else {
                SearchError::Network(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let payload: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else {
                SearchError::Parse(e.to_string())
            }
        })?;

        let mut results = providers::parse(provider, &payload);
        results.truncate(n);
        tracing::debug!("{} returned {} web results", provider.name(), results.len());
        Ok(results)
    }

    /// Like [`search`](Self::search) with the configured result count, but
    /// any failure degrades to an empty list.
    pub async fn search_or_empty(&self, query: &str) -> Vec<WebResult> {
        match self.search(query, self.settings.max_results).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!("Web search unavailable, continuing without it: {}", err);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/search", addr)
    }

    fn ddg_mock() -> Router {
        Router::new().route(
            "/search",
            get(|| async {
                Json(json!({
                    "AbstractText": "Aivancity is a school in Cachan.",
                    "AbstractURL": "https://www.aivancity.ai",
                    "RelatedTopics": [
                        { "Text": "Cachan - commune", "FirstURL": "https://duckduckgo.com/Cachan" },
                        { "Text": "Paris - capital", "FirstURL": "https://duckduckgo.com/Paris" },
                        { "Text": "France - country", "FirstURL": "https://duckduckgo.com/France" }
                    ]
                }))
            }),
        )
    }

    fn settings(endpoint: String) -> SearchSettings {
        SearchSettings {
            endpoint: Some(endpoint),
            timeout_secs: 2,
            ..SearchSettings::default()
        }
    }

    #[tokio::test]
    async fn results_are_capped_at_n() {
        let endpoint = spawn(ddg_mock()).await;
        let search = WebSearch::new(settings(endpoint)).unwrap();

        let results = search.search("Aivancity", 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://www.aivancity.ai");
        assert_eq!(search.search_or_empty("Aivancity").await.len(), 3);
    }

    #[tokio::test]
    async fn server_error_is_reported_then_swallowed() {
        let app = Router::new().route("/search", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let endpoint = spawn(app).await;
        let search = WebSearch::new(settings(endpoint)).unwrap();

        assert!(matches!(
            search.search("Aivancity", 3).await,
            Err(SearchError::Status(500))
        ));
        assert!(search.search_or_empty("Aivancity").await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_provider_degrades_to_empty() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let search = WebSearch::new(settings(format!("http://{}/search", addr))).unwrap();

        assert!(search.search_or_empty("Aivancity").await.is_empty());
    }

    #[tokio::test]
    async fn keyed_provider_without_key_is_refused() {
        let search = WebSearch::new(SearchSettings {
            provider: SearchProviderKind::Brave,
            ..SearchSettings::default()
        })
        .unwrap();

        assert!(matches!(
            search.search("Aivancity", 3).await,
            Err(SearchError::MissingApiKey("brave"))
        ));
    }

    #[tokio::test]
    async fn disabled_search_never_calls_out() {
        let search = WebSearch::disabled();
        assert!(search.search("Aivancity", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_degrades_to_empty() {
        let endpoint = spawn(ddg_mock()).await;
        let search = WebSearch::new(SearchSettings {
            rate_limit_per_minute: 1,
            ..settings(endpoint)
        })
        .unwrap();

        assert_eq!(search.search_or_empty("Aivancity").await.len(), 3);
        assert!(matches!(
            search.search("Aivancity", 3).await,
            Err(SearchError::RateLimited)
        ));
        assert!(search.search_or_empty("Aivancity").await.is_empty());
    }
}
