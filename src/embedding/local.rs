use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::OnceCell;

use super::Embedder;
use crate::core::errors::ApiError;

pub const MINILM_MODEL_ID: &str = "fastembed:all-minilm-l6-v2";

/// all-MiniLM-L6-v2 sentence embeddings run locally through fastembed.
///
/// The model files are fetched into `cache_dir` and loaded on first use, so
/// constructing the embedder is cheap. `TextEmbedding` calls are blocking
/// and always go through `spawn_blocking`.
pub struct FastEmbedder {
    cache_dir: PathBuf,
    batch_size: usize,
    model: OnceCell<Arc<TextEmbedding>>,
}

impl FastEmbedder {
    pub fn new(cache_dir: PathBuf, batch_size: usize) -> Self {
        Self {
            cache_dir,
            batch_size: batch_size.max(1),
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<TextEmbedding>, ApiError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                let cache_dir = self.cache_dir.clone();
                tracing::info!(cache_dir = %cache_dir.display(), "Loading all-MiniLM-L6-v2");
                tokio::task::spawn_blocking(move || {
                    let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                        .with_cache_dir(cache_dir)
                        .with_show_download_progress(false);
                    TextEmbedding::try_new(options).map(Arc::new).map_err(|e| {
                        ApiError::Internal(format!("Failed to load embedding model: {}", e))
                    })
                })
                .await
                .map_err(|e| ApiError::Internal(format!("embedding task failed: {}", e)))?
            })
            .await?;
        Ok(model.clone())
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    fn model_id(&self) -> String {
        MINILM_MODEL_ID.to_string()
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let model = self.model().await?;
        let texts = inputs.to_vec();
        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || model.embed(texts, Some(batch_size)))
            .await
            .map_err(|e| ApiError::Internal(format!("embedding task failed: {}", e)))?
            .map_err(|e| ApiError::Internal(format!("Embedding failed: {}", e)))
    }
}
