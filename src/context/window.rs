//! History window for the prompt.
//!
//! Keeps the newest messages that fit both a message count and an estimated
//! token budget, in chronological order.

use crate::llm::ChatMessage;

#[derive(Debug, Clone)]
pub struct HistoryWindowConfig {
    /// Maximum number of history messages replayed.
    pub max_messages: usize,
    /// Estimated-token budget for the replayed messages.
    pub token_budget: usize,
}

impl Default for HistoryWindowConfig {
    fn default() -> Self {
        Self {
            max_messages: 10,
            token_budget: 3000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextWindowManager {
    config: HistoryWindowConfig,
}

impl ContextWindowManager {
    pub fn new(config: HistoryWindowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HistoryWindowConfig {
        &self.config
    }

    /// The newest messages within both limits. Stops at the first message
    /// that does not fit so the kept history stays contiguous.
    pub fn fit(&self, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut kept = Vec::new();
        let mut used = 0usize;

        for message in history.iter().rev().take(self.config.max_messages) {
            let tokens = estimate_tokens(&message.content);
            if used + tokens > self.config.token_budget {
                break;
            }
            used += tokens;
            kept.push(message.clone());
        }

        kept.reverse();
        kept
    }

    pub fn total_tokens(&self, messages: &[ChatMessage]) -> usize {
        messages.iter().map(|m| estimate_tokens(&m.content)).sum()
    }
}

/// Roughly four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}
