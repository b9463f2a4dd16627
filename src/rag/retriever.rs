use std::sync::Arc;

use super::index::VectorIndex;
use super::RetrievedChunk;
use crate::core::errors::ApiError;
use crate::embedding::Embedder;

/// Query-time similarity search over the loaded index.
#[derive(Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// At most `k` chunks, best first. An empty index or `k == 0` answers
    /// without calling the embedder.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedChunk>, ApiError> {
        if self.index.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embedder.embed_query(query).await?;
        let results = self
            .index
            .search(&vector, k)
            .map_err(|e| ApiError::Internal(e.to_string()))?;

        tracing::debug!(
            "Retrieved {} chunks (best score {:.3})",
            results.len(),
            results.first().map(|r| r.score).unwrap_or(0.0)
        );
        Ok(results)
    }
}
