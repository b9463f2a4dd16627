//! Vector index: offline build, persistence and query-time retrieval.

pub mod builder;
pub mod index;
pub mod retriever;
pub mod store;

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::ingest::DocumentChunk;

pub use builder::{BuildReport, IndexBuilder};
pub use index::VectorIndex;
pub use retriever::Retriever;
pub use store::{IndexMeta, IndexStore};

/// A chunk returned by a similarity query, with its cosine score.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no index found at {0}; run `aivancity-assistant index` first")]
    Missing(PathBuf),
    #[error(
        "index was built with embedding model '{found}' but '{expected}' is configured; rebuild it with `aivancity-assistant index`"
    )]
    ModelMismatch { found: String, expected: String },
    #[error("index is corrupt: {0}")]
    Corrupt(String),
    #[error("index storage error: {0}")]
    Storage(String),
}
