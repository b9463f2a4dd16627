pub mod generator;
pub mod service;
pub mod session;

pub use generator::AnswerGenerator;
pub use service::{ChatEvent, ChatService, SourceRef, TurnOutcome};
pub use session::{ChatSession, Role, SessionRegistry, SessionSnapshot, SessionState, Turn};
