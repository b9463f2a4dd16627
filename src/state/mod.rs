use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::chat::{AnswerGenerator, ChatService, SessionRegistry};
use crate::context::{ContextMerger, PromptBuilder};
use crate::core::config::{AppPaths, ConfigService, LlmSettings, SearchSettings, Settings};
use crate::embedding::{build_embedder, Embedder};
use crate::llm::{LlmProvider, OpenAiProvider};
use crate::rag::{Retriever, VectorIndex};
use crate::search::WebSearch;

pub mod error;

use error::InitializationError;

/// Shared state behind every route and WebSocket connection.
///
/// Everything here is read-only once built, apart from the session
/// registry. The vector index in particular is never mutated while serving.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: ConfigService,
    pub settings: Settings,
    pub chat: Arc<ChatService>,
    pub sessions: SessionRegistry,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the serving state from already-loaded settings.
    ///
    /// Fails when a required API key is missing or when no usable index is
    /// on disk; the server must not start in either case.
    pub async fn initialize(
        config: ConfigService,
        settings: Settings,
    ) -> Result<Arc<Self>, InitializationError> {
        let chat = build_chat_service(config.paths(), &settings).await?;
        Ok(Self::from_parts(config, settings, chat))
    }

    pub fn from_parts(config: ConfigService, settings: Settings, chat: ChatService) -> Arc<Self> {
        Arc::new(AppState {
            paths: Arc::new(config.paths().clone()),
            config,
            settings,
            chat: Arc::new(chat),
            sessions: SessionRegistry::new(),
            started_at: Utc::now(),
        })
    }
}

/// Connects the LLM and search clients, loads the index and wires the chat
/// pipeline together.
pub async fn build_chat_service(
    paths: &AppPaths,
    settings: &Settings,
) -> Result<ChatService, InitializationError> {
    let llm = connect_llm(&settings.llm)?;
    let search = connect_search(&settings.search)?;
    let embedder = build_embedder(&settings.embedding, &settings.llm, &paths.model_cache_dir)
        .map_err(|e| InitializationError::Embedding(e.into()))?;

    let index = VectorIndex::load(&paths.index_db_path(), &embedder.model_id())
        .await
        .map_err(|e| InitializationError::Index(e.into()))?;
    if index.is_empty() {
        tracing::warn!(
            "Vector index at {} is empty; answers will rely on web search only",
            paths.index_db_path().display()
        );
    } else {
        tracing::info!(
            chunks = index.len(),
            model = %index.model_id(),
            "Vector index loaded"
        );
    }

    Ok(assemble_chat_service(
        settings,
        Arc::new(index),
        embedder,
        llm,
        Arc::new(search),
    ))
}

pub fn assemble_chat_service(
    settings: &Settings,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmProvider>,
    search: Arc<WebSearch>,
) -> ChatService {
    ChatService::new(
        Retriever::new(index, embedder),
        search,
        ContextMerger::new(settings.context.max_chars),
        PromptBuilder::from_settings(&settings.chat),
        AnswerGenerator::new(llm, settings.llm.clone()),
        settings.retrieval.top_k,
    )
}

fn connect_llm(settings: &LlmSettings) -> Result<Arc<dyn LlmProvider>, InitializationError> {
    let has_key = settings
        .api_key
        .as_deref()
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);
    if !has_key {
        return Err(InitializationError::MissingApiKey("OPENAI_API_KEY"));
    }

    let provider =
        OpenAiProvider::from_settings(settings).map_err(|e| InitializationError::Llm(e.into()))?;
    Ok(Arc::new(provider))
}

fn connect_search(settings: &SearchSettings) -> Result<WebSearch, InitializationError> {
    if !settings.enabled {
        tracing::info!("Web search is disabled");
        return Ok(WebSearch::disabled());
    }

    let has_key = settings
        .api_key
        .as_deref()
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);
    if settings.provider.requires_api_key() && !has_key {
        return Err(InitializationError::MissingApiKey("SEARCH_API_KEY"));
    }

    WebSearch::new(settings.clone()).map_err(|e| InitializationError::Search(e.into()))
}
