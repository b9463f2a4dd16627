use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

/// Sends prompts to the LLM. No retries: a failed call is reported as is.
#[derive(Clone)]
pub struct AnswerGenerator {
    llm: Arc<dyn LlmProvider>,
    settings: LlmSettings,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, settings: LlmSettings) -> Self {
        Self { llm, settings }
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub async fn generate(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let request = ChatRequest::new(messages).with_settings(&self.settings);
        self.llm.stream_chat(request).await
    }

    /// Whole answer in one response, at the given temperature.
    pub async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        temperature: f64,
    ) -> Result<String, ApiError> {
        let request = ChatRequest::new(messages)
            .with_settings(&self.settings)
            .with_temperature(temperature);
        self.llm.chat(request).await
    }
}
