use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aivancity_assistant::chat::service::GENERATION_FAILED_MESSAGE;
use aivancity_assistant::core::config::{AppPaths, ConfigService, Settings};
use aivancity_assistant::core::errors::ApiError;
use aivancity_assistant::embedding::{Embedder, HashingEmbedder};
use aivancity_assistant::ingest::DocumentChunk;
use aivancity_assistant::llm::{ChatRequest, LlmProvider};
use aivancity_assistant::rag::VectorIndex;
use aivancity_assistant::search::WebSearch;
use aivancity_assistant::server::router::router;
use aivancity_assistant::server::ws::handler::BUSY_MESSAGE;
use aivancity_assistant::state::{assemble_chat_service, AppState};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Streams one scripted reply per call, pausing before every token.
struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<Vec<&'static str>, &'static str>>>,
    token_delay: Duration,
}

impl ScriptedLlm {
    fn new(
        replies: Vec<Result<Vec<&'static str>, &'static str>>,
        token_delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            token_delay,
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn chat(&self, _request: ChatRequest) -> Result<String, ApiError> {
        Err(ApiError::Internal("not scripted".into()))
    }

    async fn stream_chat(
        &self,
        _request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err("script exhausted"));
        let delay = self.token_delay;
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(async move {
            match reply {
                Ok(tokens) => {
                    for token in tokens {
                        tokio::time::sleep(delay).await;
                        if tx.send(Ok(token.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Err(message) => {
                    let _ = tx.send(Err(ApiError::Upstream(message.to_string()))).await;
                }
            }
        });

        Ok(rx)
    }
}

async fn spawn_app(llm: Arc<ScriptedLlm>) -> (String, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let paths = Arc::new(AppPaths::with_data_dir(
        tmp.path().to_path_buf(),
        tmp.path().join("data"),
    ));
    let config = ConfigService::new(paths).with_config_path(Some(tmp.path().join("config.yml")));

    let embedder = Arc::new(HashingEmbedder::new(128));
    let texts = [
        "Aivancity is located in Cachan.",
        "The bachelor program lasts three years.",
    ];
    let vectors = embedder
        .embed(&texts.iter().map(|t| t.to_string()).collect::<Vec<_>>())
        .await
        .unwrap();
    let entries = texts
        .iter()
        .zip(vectors)
        .enumerate()
        .map(|(i, (text, vector))| {
            (
                DocumentChunk {
                    id: DocumentChunk::chunk_id("brochure.pdf", i + 1, 0),
                    source_file: "brochure.pdf".to_string(),
                    page: i + 1,
                    start_offset: 0,
                    chunk_index: 0,
                    text: text.to_string(),
                },
                vector,
            )
        })
        .collect();
    let index = VectorIndex::from_entries(entries, embedder.model_id()).unwrap();

    let settings = Settings::default();
    let chat = assemble_chat_service(
        &settings,
        Arc::new(index),
        embedder,
        llm,
        Arc::new(WebSearch::disabled()),
    );
    let state = AppState::from_parts(config, settings, chat);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    (format!("127.0.0.1:{}", addr.port()), tmp)
}

async fn next_json(ws: &mut Socket) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).unwrap();
        }
    }
}

async fn send(ws: &mut Socket, payload: Value) {
    ws.send(Message::Text(payload.to_string().into()))
        .await
        .unwrap();
}

/// Frames up to and including the first `done` or `error`.
async fn collect_turn(ws: &mut Socket) -> Vec<Value> {
    let mut frames = Vec::new();
    loop {
        let frame = next_json(ws).await;
        let kind = frame["type"].as_str().unwrap_or_default().to_string();
        frames.push(frame);
        if kind == "done" || (kind == "error" && !is_busy(frames.last().unwrap())) {
            return frames;
        }
    }
}

fn is_busy(frame: &Value) -> bool {
    frame["type"] == "error" && frame["message"] == BUSY_MESSAGE
}

fn answer_text(frames: &[Value]) -> String {
    frames
        .iter()
        .filter(|f| f["type"] == "chunk")
        .filter_map(|f| f["message"].as_str())
        .collect()
}

#[tokio::test]
async fn chat_turn_streams_sources_and_answer() {
    let llm = ScriptedLlm::new(
        vec![Ok(vec!["Aivancity is ", "located in ", "Cachan."])],
        Duration::from_millis(5),
    );
    let (addr, _tmp) = spawn_app(llm).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(
        welcome["message"],
        "Welcome to Aivancity Assistant! How can I help you today?"
    );
    let session_id = welcome["sessionId"].as_str().unwrap().to_string();

    send(&mut ws, json!({"type": "message", "message": "Where is Aivancity located?"})).await;
    let frames = collect_turn(&mut ws).await;

    assert_eq!(frames[0]["type"], "sources");
    assert_eq!(frames[0]["documents"][0]["sourceFile"], "brochure.pdf");
    assert_eq!(frames[0]["documents"][0]["page"], 1);
    assert_eq!(frames[0]["web"], json!([]));
    assert_eq!(answer_text(&frames), "Aivancity is located in Cachan.");
    assert_eq!(frames.last().unwrap()["type"], "done");

    send(&mut ws, json!({"type": "history"})).await;
    let history = next_json(&mut ws).await;
    assert_eq!(history["type"], "history");
    assert_eq!(history["messages"][0]["role"], "user");
    assert_eq!(history["messages"][1]["role"], "assistant");
    assert_eq!(history["messages"][1]["content"], "Aivancity is located in Cachan.");

    let sessions: Value = reqwest::get(format!("http://{}/api/sessions/{}", addr, session_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sessions["session"]["turnCount"], 2);
    assert_eq!(sessions["session"]["state"], "idle");

    send(&mut ws, json!({"type": "reset"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "reset");
    send(&mut ws, json!({"type": "history"})).await;
    assert_eq!(next_json(&mut ws).await["messages"], json!([]));
}

#[tokio::test]
async fn message_during_turn_is_rejected_as_busy() {
    let llm = ScriptedLlm::new(
        vec![Ok(vec!["One ", "moment ", "please."])],
        Duration::from_millis(150),
    );
    let (addr, _tmp) = spawn_app(llm).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    next_json(&mut ws).await;

    send(&mut ws, json!({"type": "message", "message": "First question"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "sources");
    send(&mut ws, json!({"type": "message", "message": "Second question"})).await;

    let frames = collect_turn(&mut ws).await;

    assert!(frames.iter().any(is_busy));
    assert_eq!(answer_text(&frames), "One moment please.");
    assert_eq!(frames.last().unwrap()["type"], "done");
}

#[tokio::test]
async fn llm_failure_is_reported_and_session_recovers() {
    let llm = ScriptedLlm::new(
        vec![Err("upstream exploded"), Ok(vec!["Back ", "online."])],
        Duration::from_millis(5),
    );
    let (addr, _tmp) = spawn_app(llm).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    next_json(&mut ws).await;

    send(&mut ws, json!({"type": "message", "message": "Hello?"})).await;
    let failed = collect_turn(&mut ws).await;
    let last = failed.last().unwrap();
    assert_eq!(last["type"], "error");
    assert_eq!(last["message"], GENERATION_FAILED_MESSAGE);

    send(&mut ws, json!({"type": "message", "message": "Hello again?"})).await;
    let recovered = collect_turn(&mut ws).await;
    assert_eq!(answer_text(&recovered), "Back online.");
    assert_eq!(recovered.last().unwrap()["type"], "done");
}

#[tokio::test]
async fn invalid_frames_get_an_error_reply() {
    let llm = ScriptedLlm::new(vec![], Duration::from_millis(5));
    let (addr, _tmp) = spawn_app(llm).await;
    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    next_json(&mut ws).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["message"], "Invalid message format");

    send(&mut ws, json!({"type": "message", "message": "   "})).await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["message"], "Message cannot be empty");
}

#[tokio::test]
async fn status_and_health_endpoints_report_state() {
    let llm = ScriptedLlm::new(vec![], Duration::from_millis(5));
    let (addr, _tmp) = spawn_app(llm).await;

    let health: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let status: Value = reqwest::get(format!("http://{}/api/status", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["index"]["chunks"], 2);
    assert_eq!(status["index"]["embeddingModel"], "hashing-128");
    assert_eq!(status["search"]["enabled"], false);
    assert_eq!(status["llm"]["model"], "scripted-model");

    let page = reqwest::get(format!("http://{}/", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("Aivancity Assistant"));

    let missing = reqwest::get(format!("http://{}/api/sessions/nope", addr))
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}
