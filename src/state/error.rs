use thiserror::Error;

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("Invalid configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("{0} is not set; add it to the environment or .env file")]
    MissingApiKey(&'static str),

    #[error("Failed to load vector index: {0}")]
    Index(#[source] anyhow::Error),

    #[error("Failed to initialize embedder: {0}")]
    Embedding(#[source] anyhow::Error),

    #[error("Failed to initialize web search: {0}")]
    Search(#[source] anyhow::Error),

    #[error("Failed to initialize LLM client: {0}")]
    Llm(#[source] anyhow::Error),
}
