//! Request construction and response parsing for each search provider.

use serde_json::Value;

use super::WebResult;
use crate::core::config::SearchProviderKind;

const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const BING_ENDPOINT: &str = "https://api.bing.microsoft.com/v7.0/search";
const GOOGLE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// Google Custom Search caps `num` at 10.
const GOOGLE_MAX_NUM: usize = 10;

pub fn default_endpoint(provider: SearchProviderKind) -> &'static str {
    match provider {
        SearchProviderKind::Duckduckgo => DUCKDUCKGO_ENDPOINT,
        SearchProviderKind::Brave => BRAVE_ENDPOINT,
        SearchProviderKind::Bing => BING_ENDPOINT,
        SearchProviderKind::Google => GOOGLE_ENDPOINT,
    }
}

pub struct ProviderRequest<'a> {
    pub provider: SearchProviderKind,
    pub endpoint: &'a str,
    pub query: &'a str,
    pub count: usize,
    pub api_key: Option<&'a str>,
    pub engine_id: Option<&'a str>,
}

impl ProviderRequest<'_> {
    pub fn build(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        let query = urlencoding::encode(self.query);
        let key = self.api_key.unwrap_or_default();

        match self.provider {
            SearchProviderKind::Duckduckgo => client.get(format!(
                "{}?q={}&format=json&no_redirect=1&no_html=1",
                self.endpoint, query
            )),
            SearchProviderKind::Brave => client
                .get(format!("{}?q={}&count={}", self.endpoint, query, self.count))
                .header("X-Subscription-Token", key)
                .header("Accept", "application/json"),
            SearchProviderKind::Bing => client
                .get(format!("{}?q={}&count={}", self.endpoint, query, self.count))
                .header("Ocp-Apim-Subscription-Key", key),
            SearchProviderKind::Google => client.get(format!(
                "{}?key={}&cx={}&q={}&num={}",
                self.endpoint,
                urlencoding::encode(key),
                urlencoding::encode(self.engine_id.unwrap_or_default()),
                query,
                self.count.clamp(1, GOOGLE_MAX_NUM)
            )),
        }
    }
}

pub fn parse(provider: SearchProviderKind, payload: &Value) -> Vec<WebResult> {
    match provider {
        SearchProviderKind::Duckduckgo => parse_duckduckgo(payload),
        SearchProviderKind::Brave => parse_items(
            payload.get("web").and_then(|w| w.get("results")),
            "title",
            "url",
            "description",
        ),
        SearchProviderKind::Bing => parse_items(
            payload.get("webPages").and_then(|wp| wp.get("value")),
            "name",
            "url",
            "snippet",
        ),
        SearchProviderKind::Google => parse_items(payload.get("items"), "title", "link", "snippet"),
    }
}

fn parse_items(items: Option<&Value>, title_key: &str, url_key: &str, snippet_key: &str) -> Vec<WebResult> {
    let Some(items) = items.and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let title = item.get(title_key).and_then(|v| v.as_str()).unwrap_or("");
            let url = item.get(url_key).and_then(|v| v.as_str()).unwrap_or("");
            let snippet = item.get(snippet_key).and_then(|v| v.as_str()).unwrap_or("");
            if title.is_empty() || url.is_empty() {
                return None;
            }
            Some(WebResult {
                title: title.to_string(),
                snippet: snippet.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

fn parse_duckduckgo(payload: &Value) -> Vec<WebResult> {
    let mut results = Vec::new();

    let abstract_text = payload.get("AbstractText").and_then(|v| v.as_str()).unwrap_or("");
    let abstract_url = payload.get("AbstractURL").and_then(|v| v.as_str()).unwrap_or("");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let heading = payload
            .get("Heading")
            .and_then(|v| v.as_str())
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| abstract_text.split(" - ").next().unwrap_or(abstract_text));
        results.push(WebResult {
            title: heading.to_string(),
            snippet: abstract_text.to_string(),
            url: abstract_url.to_string(),
        });
    }

    if let Some(items) = payload.get("Results").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }
    if let Some(items) = payload.get("RelatedTopics").and_then(|v| v.as_array()) {
        extract_ddg_topics(items, &mut results);
    }

    results
}

fn extract_ddg_topics(items: &[Value], results: &mut Vec<WebResult>) {
    for item in items {
        if let Some(topics) = item.get("Topics").and_then(|v| v.as_array()) {
            extract_ddg_topics(topics, results);
            continue;
        }
        let text = item.get("Text").and_then(|v| v.as_str()).unwrap_or("");
        let url = item.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
        if text.is_empty() || url.is_empty() {
            continue;
        }
        results.push(WebResult {
            title: text.split(" - ").next().unwrap_or(text).to_string(),
            snippet: text.to_string(),
            url: url.to_string(),
        });
    }
}
