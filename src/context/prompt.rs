use super::merger::MergedContext;
use super::window::{ContextWindowManager, HistoryWindowConfig};
use crate::core::config::ChatSettings;
use crate::llm::ChatMessage;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an AI assistant for Aivancity School for Technology, Business and Society. \
Your role is to provide accurate and helpful information about the school based on the context you are given. \
Always be professional and maintain a helpful tone. \
If you don't know something or the context does not contain enough information, say so.";

pub const NO_CONTEXT_NOTICE: &str = "No information is available from the school documents or the web for this question. \
Tell the user you could not find the answer instead of guessing.";

/// Assembles the message list: persona, context block, recent history,
/// then the new user message.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    window: ContextWindowManager,
}

impl PromptBuilder {
    pub fn new(system_prompt: impl Into<String>, window: ContextWindowManager) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            window,
        }
    }

    pub fn from_settings(settings: &ChatSettings) -> Self {
        let system_prompt = settings
            .system_prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Self::new(
            system_prompt,
            ContextWindowManager::new(HistoryWindowConfig {
                max_messages: settings.history_turns,
                token_budget: settings.history_token_budget,
            }),
        )
    }

    pub fn build(
        &self,
        context: &MergedContext,
        history: &[ChatMessage],
        user_message: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::system(context_block(context)),
        ];
        messages.extend(self.window.fit(history));
        messages.push(ChatMessage::user(user_message));
        messages
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::from_settings(&ChatSettings::default())
    }
}

fn context_block(context: &MergedContext) -> String {
    if context.is_empty() {
        return NO_CONTEXT_NOTICE.to_string();
    }
    format!(
        "Answer using the context below. Numbered entries are excerpts from school documents \
or web results; mention the source when you rely on one.\n\nContext:\n{}",
        context.text
    )
}
