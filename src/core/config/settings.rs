//! Typed view over the merged configuration document.
//!
//! Every section falls back to its defaults, so an empty `config.yml` (or no
//! file at all) yields a working setup apart from the API keys.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub ingest: IngestSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub search: SearchSettings,
    pub context: ContextSettings,
    pub llm: LlmSettings,
    pub chat: ChatSettings,
    pub server: ServerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared between neighbouring chunks.
    pub chunk_overlap: usize,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// all-MiniLM-L6-v2 run locally; downloaded once into the model cache.
    Fastembed,
    /// Lexical feature-hashing fallback for fully offline setups.
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProviderKind,
    /// Remote embedding model name; only read by the `openai` provider.
    pub model: String,
    /// Vector width of the hashing embedder. Ignored by the other providers.
    pub dimension: usize,
    pub batch_size: usize,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Fastembed,
            model: "text-embedding-3-small".to_string(),
            dimension: 384,
            batch_size: 32,
            base_url: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchProviderKind {
    Duckduckgo,
    Brave,
    Bing,
    Google,
}

impl SearchProviderKind {
    pub fn requires_api_key(self) -> bool {
        !matches!(self, SearchProviderKind::Duckduckgo)
    }

    pub fn name(self) -> &'static str {
        match self {
            SearchProviderKind::Duckduckgo => "duckduckgo",
            SearchProviderKind::Brave => "brave",
            SearchProviderKind::Bing => "bing",
            SearchProviderKind::Google => "google",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub enabled: bool,
    pub provider: SearchProviderKind,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub rate_limit_per_minute: u32,
    pub api_key: Option<String>,
    /// Google Custom Search engine id (`cx`).
    pub engine_id: Option<String>,
    /// Overrides the provider's endpoint URL.
    pub endpoint: Option<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: SearchProviderKind::Duckduckgo,
            max_results: 3,
            timeout_secs: 10,
            rate_limit_per_minute: 30,
            api_key: None,
            engine_id: None,
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    /// Upper bound, in characters, of the merged context block.
    pub max_chars: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self { max_chars: 6000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.7,
            max_tokens: None,
            timeout_secs: 120,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    /// Number of trailing user/assistant turns replayed into the prompt.
    pub history_turns: usize,
    /// Estimated-token budget for the replayed history.
    pub history_token_budget: usize,
    pub system_prompt: Option<String>,
    pub welcome_message: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            history_turns: 10,
            history_token_budget: 3000,
            system_prompt: None,
            welcome_message: "Welcome to Aivancity Assistant! How can I help you today?"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            allowed_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let settings: Settings = serde_json::from_value(json!({})).unwrap();

        assert_eq!(settings.ingest.chunk_size, 1000);
        assert_eq!(settings.ingest.chunk_overlap, 200);
        assert_eq!(settings.retrieval.top_k, 4);
        assert_eq!(settings.search.provider, SearchProviderKind::Duckduckgo);
        assert_eq!(settings.embedding.provider, EmbeddingProviderKind::Fastembed);
        assert_eq!(settings.llm.model, "gpt-3.5-turbo");
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let settings: Settings = serde_json::from_value(json!({
            "search": { "provider": "brave", "max_results": 5 },
            "retrieval": { "top_k": 3 }
        }))
        .unwrap();

        assert_eq!(settings.search.provider, SearchProviderKind::Brave);
        assert_eq!(settings.search.max_results, 5);
        assert_eq!(settings.search.timeout_secs, 10);
        assert!(settings.search.provider.requires_api_key());
        assert_eq!(settings.retrieval.top_k, 3);
    }
}
