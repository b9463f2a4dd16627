use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;

use super::protocol::{WsIncomingMessage, WsOutgoingMessage};
use crate::chat::{ChatEvent, ChatSession, TurnOutcome};
use crate::core::errors::ApiError;
use crate::server::router::allowed_origins;
use crate::state::AppState;

pub const BUSY_MESSAGE: &str =
    "Please wait for the current answer to finish before sending another message.";

type WsSender = SplitSink<WebSocket, Message>;

enum Flow {
    Continue,
    Closed,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let origin_ok = validate_origin(&headers, &state);
    ws.on_upgrade(move |socket| handle_socket(socket, state, origin_ok))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, origin_ok: bool) {
    let (mut sender, mut receiver) = socket.split();

    if !origin_ok {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: 4003,
                reason: "Forbidden: Invalid Origin".into(),
            })))
            .await;
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<WsIncomingMessage>();

    tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    // Unparsable frames become a typeless message and get an error reply.
                    let incoming =
                        serde_json::from_str::<WsIncomingMessage>(&text).unwrap_or_default();
                    if tx.send(incoming).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let mut session = ChatSession::new();
    state.sessions.update(&session).await;
    tracing::info!(session = %session.id(), "Chat session opened");

    let welcome = WsOutgoingMessage::Welcome {
        session_id: session.id().to_string(),
        message: state.settings.chat.welcome_message.clone(),
    };

    if send_json(&mut sender, &welcome).await.is_ok() {
        while let Some(incoming) = rx.recv().await {
            match handle_message(&mut sender, &state, &mut session, &mut rx, incoming).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Closed) => break,
                Err(err) => {
                    let reply = WsOutgoingMessage::error(client_message(&err));
                    if send_json(&mut sender, &reply).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    state.sessions.remove(session.id()).await;
    tracing::info!(session = %session.id(), "Chat session closed");
}

async fn handle_message(
    sender: &mut WsSender,
    state: &Arc<AppState>,
    session: &mut ChatSession,
    rx: &mut mpsc::UnboundedReceiver<WsIncomingMessage>,
    data: WsIncomingMessage,
) -> Result<Flow, ApiError> {
    match data.msg_type.as_deref().unwrap_or("") {
        "message" => {
            let message = data.message.unwrap_or_default();
            if message.trim().is_empty() {
                return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
            }
            let flow = stream_turn(sender, state, session, rx, &message).await;
            state.sessions.update(session).await;
            flow
        }
        "history" => {
            let history = WsOutgoingMessage::History {
                messages: session.turns().to_vec(),
            };
            send_json(sender, &history).await?;
            Ok(Flow::Continue)
        }
        "reset" => {
            session.reset()?;
            state.sessions.update(session).await;
            send_json(sender, &WsOutgoingMessage::Reset).await?;
            Ok(Flow::Continue)
        }
        "" => Err(ApiError::BadRequest("Invalid message format".to_string())),
        other => Err(ApiError::BadRequest(format!(
            "Unknown message type: {}",
            other
        ))),
    }
}

/// Runs one turn while forwarding its events to the socket.
///
/// Messages that arrive before the turn finishes are answered with a busy
/// error. If the client goes away the turn future is dropped, which also
/// drops the LLM stream.
async fn stream_turn(
    sender: &mut WsSender,
    state: &Arc<AppState>,
    session: &mut ChatSession,
    rx: &mut mpsc::UnboundedReceiver<WsIncomingMessage>,
    message: &str,
) -> Result<Flow, ApiError> {
    let (events_tx, mut events_rx) = mpsc::channel::<ChatEvent>(64);

    let outcome = {
        let turn = state.chat.run_turn(session, message, &events_tx);
        tokio::pin!(turn);

        loop {
            tokio::select! {
                biased;
                Some(event) = events_rx.recv() => {
                    send_json(sender, &WsOutgoingMessage::from(event)).await?;
                }
                result = &mut turn => break result?,
                incoming = rx.recv() => match incoming {
                    Some(_) => send_json(sender, &WsOutgoingMessage::error(BUSY_MESSAGE)).await?,
                    None => return Ok(Flow::Closed),
                },
            }
        }
    };

    drop(events_tx);
    while let Some(event) = events_rx.recv().await {
        send_json(sender, &WsOutgoingMessage::from(event)).await?;
    }

    match outcome {
        TurnOutcome::Completed(_) => Ok(Flow::Continue),
        TurnOutcome::Failed(reason) => {
            tracing::warn!(session = %session.id(), "Turn ended with an error: {}", reason);
            Ok(Flow::Continue)
        }
        TurnOutcome::Disconnected => Ok(Flow::Closed),
    }
}

pub async fn send_json<T: Serialize>(sender: &mut WsSender, payload: &T) -> Result<(), ApiError> {
    let text = serde_json::to_string(payload).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}

fn client_message(err: &ApiError) -> String {
    match err {
        ApiError::BadRequest(msg) | ApiError::Conflict(msg) | ApiError::NotFound(msg) => {
            msg.clone()
        }
        other => other.to_string(),
    }
}

/// Browsers always send `Origin`; other clients (CLI tools, tests) may not.
fn validate_origin(headers: &HeaderMap, state: &AppState) -> bool {
    let Some(origin) = headers.get("origin").and_then(|v| v.to_str().ok()) else {
        return true;
    };

    allowed_origins(&state.settings.server)
        .iter()
        .any(|allowed| allowed == origin)
}
