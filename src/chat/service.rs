//! One chat turn, end to end.
//!
//! Retrieval and web search run concurrently; either failing leaves the turn
//! with less context rather than failing it. Only an LLM error is surfaced to
//! the user, and the session is always back to `Idle` when `run_turn`
//! returns.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use super::generator::AnswerGenerator;
use super::session::ChatSession;
use crate::context::{ContextMerger, MergedContext, PromptBuilder};
use crate::core::errors::ApiError;
use crate::rag::{RetrievedChunk, Retriever};
use crate::search::{WebResult, WebSearch};

pub const GENERATION_FAILED_MESSAGE: &str =
    "Sorry, I could not generate an answer right now. Please try again.";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRef {
    pub id: String,
    pub source_file: String,
    pub page: usize,
    pub score: f32,
}

impl From<&RetrievedChunk> for SourceRef {
    fn from(doc: &RetrievedChunk) -> Self {
        Self {
            id: doc.chunk.id.clone(),
            source_file: doc.chunk.source_file.clone(),
            page: doc.chunk.page,
            score: doc.score,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    Sources {
        documents: Vec<SourceRef>,
        web: Vec<WebResult>,
    },
    Token(String),
    Done,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed(String),
    Failed(String),
    /// The event receiver went away mid-turn.
    Disconnected,
}

pub struct ChatService {
    retriever: Retriever,
    search: Arc<WebSearch>,
    merger: ContextMerger,
    prompt: PromptBuilder,
    generator: AnswerGenerator,
    top_k: usize,
}

impl ChatService {
    pub fn new(
        retriever: Retriever,
        search: Arc<WebSearch>,
        merger: ContextMerger,
        prompt: PromptBuilder,
        generator: AnswerGenerator,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            search,
            merger,
            prompt,
            generator,
            top_k,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn search(&self) -> &WebSearch {
        &self.search
    }

    pub fn generator(&self) -> &AnswerGenerator {
        &self.generator
    }

    pub fn merger(&self) -> &ContextMerger {
        &self.merger
    }

    pub fn prompt(&self) -> &PromptBuilder {
        &self.prompt
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieval and web search joined, then merged. Never fails.
    pub async fn gather_context(&self, query: &str) -> MergedContext {
        let (documents, web) = tokio::join!(
            self.retriever.retrieve(query, self.top_k),
            self.search.search_or_empty(query)
        );
        let documents = documents.unwrap_or_else(|err| {
            tracing::warn!("Retrieval failed, continuing without documents: {}", err);
            Vec::new()
        });
        self.merger.merge(documents, web)
    }

    pub async fn run_turn(
        &self,
        session: &mut ChatSession,
        message: &str,
        events: &mpsc::Sender<ChatEvent>,
    ) -> Result<TurnOutcome, ApiError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
        }

        let history = session.history_messages();
        session.begin_turn(message)?;
        tracing::info!(session = %session.id(), "Turn started");

        let context = self.gather_context(message).await;
        let prompt = self.prompt.build(&context, &history, message);

        let sources = ChatEvent::Sources {
            documents: context.documents.iter().map(SourceRef::from).collect(),
            web: context.web.clone(),
        };
        if events.send(sources).await.is_err() {
            session.fail_turn();
            return Ok(TurnOutcome::Disconnected);
        }

        let mut stream = match self.generator.generate(prompt).await {
            Ok(stream) => stream,
            Err(err) => return Ok(self.fail(session, events, err).await),
        };

        let mut answer = String::new();
        while let Some(item) = stream.recv().await {
            match item {
                Ok(token) => {
                    answer.push_str(&token);
                    if events.send(ChatEvent::Token(token)).await.is_err() {
                        session.fail_turn();
                        return Ok(TurnOutcome::Disconnected);
                    }
                }
                Err(err) => return Ok(self.fail(session, events, err).await),
            }
        }

        session.complete_turn(&answer);
        tracing::info!(session = %session.id(), chars = answer.chars().count(), "Turn completed");
        if events.send(ChatEvent::Done).await.is_err() {
            return Ok(TurnOutcome::Disconnected);
        }
        Ok(TurnOutcome::Completed(answer))
    }

    async fn fail(
        &self,
        session: &mut ChatSession,
        events: &mpsc::Sender<ChatEvent>,
        err: ApiError,
    ) -> TurnOutcome {
        tracing::error!(session = %session.id(), "Answer generation failed: {}", err);
        session.fail_turn();
        let _ = events
            .send(ChatEvent::Error(GENERATION_FAILED_MESSAGE.to_string()))
            .await;
        TurnOutcome::Failed(err.to_string())
    }
}
