//! PDF ingestion: page extraction and chunking.

pub mod loader;
pub mod splitter;

use serde::{Deserialize, Serialize};

pub use loader::{DocumentLoader, LoadReport, SkippedFile};
pub use splitter::TextSplitter;

/// Text of a single PDF page, 1-based page number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub source_file: String,
    pub page: usize,
    pub text: String,
}

/// A bounded slice of a page, the unit that gets embedded and retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub source_file: String,
    pub page: usize,
    /// Character offset of the chunk within its page.
    pub start_offset: usize,
    /// Position of the chunk within its page.
    pub chunk_index: usize,
    pub text: String,
}

impl DocumentChunk {
    pub fn chunk_id(source_file: &str, page: usize, chunk_index: usize) -> String {
        format!("{}#p{}-{}", source_file, page, chunk_index)
    }
}
