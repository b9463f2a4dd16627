use serde::{Deserialize, Serialize};

use crate::chat::{ChatEvent, SourceRef, Turn};
use crate::search::WebResult;

#[derive(Debug, Deserialize, Default)]
pub struct WsIncomingMessage {
    #[serde(rename = "type")]
    pub msg_type: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutgoingMessage {
    Welcome {
        #[serde(rename = "sessionId")]
        session_id: String,
        message: String,
    },
    Sources {
        documents: Vec<SourceRef>,
        web: Vec<WebResult>,
    },
    Chunk {
        message: String,
    },
    Done,
    Error {
        message: String,
    },
    History {
        messages: Vec<Turn>,
    },
    Reset,
}

impl WsOutgoingMessage {
    pub fn error(message: impl Into<String>) -> Self {
        WsOutgoingMessage::Error {
            message: message.into(),
        }
    }
}

impl From<ChatEvent> for WsOutgoingMessage {
    fn from(event: ChatEvent) -> Self {
        match event {
            ChatEvent::Sources { documents, web } => WsOutgoingMessage::Sources { documents, web },
            ChatEvent::Token(message) => WsOutgoingMessage::Chunk { message },
            ChatEvent::Done => WsOutgoingMessage::Done,
            ChatEvent::Error(message) => WsOutgoingMessage::Error { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn outgoing_messages_are_tagged_by_type() {
        let welcome = WsOutgoingMessage::Welcome {
            session_id: "abc".to_string(),
            message: "hi".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&welcome).unwrap(),
            json!({"type": "welcome", "sessionId": "abc", "message": "hi"})
        );

        let chunk: WsOutgoingMessage = ChatEvent::Token("Cach".to_string()).into();
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"type": "chunk", "message": "Cach"})
        );
        assert_eq!(
            serde_json::to_value(&WsOutgoingMessage::Done).unwrap(),
            json!({"type": "done"})
        );
    }

    #[test]
    fn incoming_tolerates_missing_fields() {
        let parsed: WsIncomingMessage = serde_json::from_str(r#"{"type":"history"}"#).unwrap();
        assert_eq!(parsed.msg_type.as_deref(), Some("history"));
        assert!(parsed.message.is_none());
    }
}
