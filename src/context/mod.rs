//! Turning retrieval and search results into the prompt sent to the LLM.

pub mod merger;
pub mod prompt;
pub mod window;

pub use merger::{ContextMerger, MergedContext};
pub use prompt::PromptBuilder;
pub use window::{ContextWindowManager, HistoryWindowConfig};
