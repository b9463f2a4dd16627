//! Per-connection conversation state and the registry of live sessions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::llm::ChatMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

/// One user's conversation. Lives as long as the connection that owns it.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: String,
    turns: Vec<Turn>,
    state: SessionState,
    created_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            state: SessionState::Idle,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// History as LLM messages, oldest first.
    pub fn history_messages(&self) -> Vec<ChatMessage> {
        self.turns
            .iter()
            .map(|turn| match turn.role {
                Role::User => ChatMessage::user(turn.content.clone()),
                Role::Assistant => ChatMessage::assistant(turn.content.clone()),
            })
            .collect()
    }

    /// Records the user message and moves to `AwaitingResponse`.
    pub fn begin_turn(&mut self, message: &str) -> Result<(), ApiError> {
        if self.state == SessionState::AwaitingResponse {
            return Err(ApiError::Conflict(
                "A response is still being generated; please wait for it to finish.".to_string(),
            ));
        }
        self.push(Role::User, message);
        self.state = SessionState::AwaitingResponse;
        Ok(())
    }

    pub fn complete_turn(&mut self, answer: &str) {
        self.push(Role::Assistant, answer);
        self.state = SessionState::Idle;
    }

    /// Ends a turn without an answer. The user message stays in history.
    pub fn fail_turn(&mut self) {
        self.state = SessionState::Idle;
    }

    pub fn reset(&mut self) -> Result<(), ApiError> {
        if self.state == SessionState::AwaitingResponse {
            return Err(ApiError::Conflict(
                "Cannot reset while a response is being generated.".to_string(),
            ));
        }
        self.turns.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            state: self.state,
            created_at: self.created_at,
            last_activity: self.turns.last().map(|t| t.timestamp).unwrap_or(self.created_at),
            turn_count: self.turns.len(),
            turns: self.turns.clone(),
        }
    }

    fn push(&mut self, role: Role, content: &str) {
        self.turns.push(Turn {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub turns: Vec<Turn>,
}

impl SessionSnapshot {
    pub fn without_turns(mut self) -> Self {
        self.turns.clear();
        self
    }
}

/// Read-only view of the sessions currently connected, for inspection.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, SessionSnapshot>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn update(&self, session: &ChatSession) {
        self.sessions
            .write()
            .await
            .insert(session.id().to_string(), session.snapshot());
    }

    pub async fn remove(&self, id: &str) {
        self.sessions.write().await.remove(id);
    }

    pub async fn get(&self, id: &str) -> Option<SessionSnapshot> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Summaries without turn contents, most recently active first.
    pub async fn list(&self) -> Vec<SessionSnapshot> {
        let mut sessions: Vec<SessionSnapshot> = self
            .sessions
            .read()
            .await
            .values()
            .cloned()
            .map(SessionSnapshot::without_turns)
            .collect();
        sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_lifecycle_moves_between_states() {
        let mut session = ChatSession::new();
        assert_eq!(session.state(), SessionState::Idle);

        session.begin_turn("Where is the campus?").unwrap();
        assert_eq!(session.state(), SessionState::AwaitingResponse);
        assert!(matches!(session.begin_turn("again?"), Err(ApiError::Conflict(_))));

        session.complete_turn("In Cachan.");
        assert_eq!(session.state(), SessionState::Idle);

        let history = session.history_messages();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ChatMessage::user("Where is the campus?"));
        assert_eq!(history[1], ChatMessage::assistant("In Cachan."));
    }

    #[test]
    fn failed_turn_keeps_user_message() {
        let mut session = ChatSession::new();
        session.begin_turn("Hello").unwrap();
        session.fail_turn();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.turns().len(), 1);
        assert!(session.begin_turn("Hello again").is_ok());
    }

    #[test]
    fn reset_is_refused_mid_turn() {
        let mut session = ChatSession::new();
        session.begin_turn("Hello").unwrap();
        assert!(session.reset().is_err());

        session.complete_turn("Hi");
        session.reset().unwrap();
        assert!(session.turns().is_empty());
    }

    #[tokio::test]
    async fn registry_tracks_snapshots() {
        let registry = SessionRegistry::new();
        let mut session = ChatSession::with_id("abc");
        registry.update(&session).await;

        session.begin_turn("Hi").unwrap();
        session.complete_turn("Hello!");
        registry.update(&session).await;

        let snapshot = registry.get("abc").await.unwrap();
        assert_eq!(snapshot.turn_count, 2);
        assert_eq!(snapshot.turns.len(), 2);

        let listed = registry.list().await;
        assert_eq!(listed.len(), 1);
        assert!(listed[0].turns.is_empty());

        registry.remove("abc").await;
        assert_eq!(registry.len().await, 0);
    }
}
