pub mod chat;
pub mod cli;
pub mod context;
pub mod core;
pub mod embedding;
pub mod eval;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod search;
pub mod server;
pub mod state;
