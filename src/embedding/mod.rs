//! Text embedders used both to build the index and to embed queries.

mod hashing;
mod local;
mod openai;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{EmbeddingProviderKind, EmbeddingSettings, LlmSettings};
use crate::core::errors::ApiError;

pub use hashing::HashingEmbedder;
pub use local::{FastEmbedder, MINILM_MODEL_ID};
pub use openai::OpenAiEmbedder;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier recorded in the index; queries must use the same one.
    fn model_id(&self) -> String;

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, ApiError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ApiError::Upstream("Embedder returned no vector".to_string()))
    }
}

/// Builds the configured embedder. The remote one falls back to the LLM
/// endpoint and key when no dedicated ones are set; the local model keeps
/// its files under `model_cache_dir`.
pub fn build_embedder(
    settings: &EmbeddingSettings,
    llm: &LlmSettings,
    model_cache_dir: &Path,
) -> Result<Arc<dyn Embedder>, ApiError> {
    match settings.provider {
        EmbeddingProviderKind::Fastembed => Ok(Arc::new(FastEmbedder::new(
            model_cache_dir.to_path_buf(),
            settings.batch_size,
        ))),
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingEmbedder::new(settings.dimension))),
        EmbeddingProviderKind::Openai => {
            let api_key = settings
                .api_key
                .clone()
                .or_else(|| llm.api_key.clone())
                .ok_or_else(|| {
                    ApiError::BadRequest(
                        "embedding.provider is 'openai' but no EMBEDDING_API_KEY or OPENAI_API_KEY is set"
                            .to_string(),
                    )
                })?;
            let base_url = settings
                .base_url
                .clone()
                .unwrap_or_else(|| llm.base_url.clone());
            Ok(Arc::new(OpenAiEmbedder::new(
                base_url,
                api_key,
                settings.model.clone(),
            )))
        }
    }
}
