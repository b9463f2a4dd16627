use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::core::config::LlmSettings;
use crate::core::errors::ApiError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// OpenAI-compatible `/v1/chat/completions` client.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: Client,
}

impl OpenAiProvider {
    /// `timeout` bounds connecting and every wait between body chunks, so a
    /// long answer keeps streaming as long as tokens keep arriving. One-shot
    /// completions also use it as their total deadline.
    pub fn new(base_url: String, api_key: String, model: String, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(timeout.min(CONNECT_TIMEOUT))
            .read_timeout(timeout)
            .build()
            .map_err(ApiError::internal)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            timeout,
            client,
        })
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self, ApiError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("OPENAI_API_KEY is not set".to_string()))?;
        Self::new(
            settings.base_url.clone(),
            api_key,
            settings.model.clone(),
            Duration::from_secs(settings.timeout_secs.max(1)),
        )
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": stream,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
        }
        body
    }

    async fn post(&self, body: &Value, total_timeout: bool) -> Result<reqwest::Response, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let mut request = self.client.post(&url).bearer_auth(&self.api_key).json(body);
        if total_timeout {
            request = request.timeout(self.timeout);
        }
        let res = request
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "LLM request failed ({}): {}",
                status,
                error_message(&text)
            )));
        }
        Ok(res)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let res = self.post(&self.request_body(&request, false), true).await?;
        let payload: Value = res.json().await.map_err(ApiError::upstream)?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ApiError::Upstream("LLM response has no content".to_string()))
    }

    async fn stream_chat(
        &self,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<Result<String, ApiError>>, ApiError> {
        let res = self.post(&self.request_body(&request, true), false).await?;

        let (tx, rx) = mpsc::channel(32);
        let mut stream = res.bytes_stream();

        tokio::spawn(async move {
            // SSE events, and multi-byte characters, can be split across
            // network chunks; only complete lines are decoded
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(item) = stream.next().await {
                let bytes = match item {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(Err(ApiError::upstream(e))).await;
                        return;
                    }
                };
                buffer.extend_from_slice(&bytes);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&raw);
                    match parse_sse_line(line.trim()) {
                        SseLine::Delta(content) => {
                            if tx.send(Ok(content)).await.is_err() {
                                return;
                            }
                        }
                        SseLine::Done => return,
                        SseLine::Error(message) => {
                            let _ = tx.send(Err(ApiError::Upstream(message))).await;
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }

            let rest = String::from_utf8_lossy(&buffer);
            if let SseLine::Delta(content) = parse_sse_line(rest.trim()) {
                let _ = tx.send(Ok(content)).await;
            }
        });

        Ok(rx)
    }
}

enum SseLine {
    Delta(String),
    Done,
    Error(String),
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return SseLine::Skip;
    };
    if let Some(message) = json["error"]["message"].as_str() {
        return SseLine::Error(message.to_string());
    }
    match json["choices"][0]["delta"]["content"].as_str() {
        Some(content) if !content.is_empty() => SseLine::Delta(content.to_string()),
        _ => SseLine::Skip,
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatMessage;
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base: String) -> OpenAiProvider {
        OpenAiProvider::new(base, "sk-test".into(), "gpt-3.5-turbo".into(), Duration::from_secs(5)).unwrap()
    }

    fn sse_body() -> String {
        let mut body = String::new();
        for piece in ["Aivancity ", "is in ", "Cachan."] {
            body.push_str(&format!(
                "data: {}\n\n",
                json!({ "choices": [{ "delta": { "content": piece } }] })
            ));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn stream_yields_deltas_in_order() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["stream"], true);
                Response::builder()
                    .header(header::CONTENT_TYPE, "text/event-stream")
                    .body(Body::from(sse_body()))
                    .unwrap()
            }),
        );
        let llm = provider(spawn(app).await);

        let mut rx = llm
            .stream_chat(ChatRequest::new(vec![ChatMessage::user("Where?")]))
            .await
            .unwrap();

        let mut collected = Vec::new();
        while let Some(item) = rx.recv().await {
            collected.push(item.unwrap());
        }
        assert_eq!(collected, vec!["Aivancity ", "is in ", "Cachan."]);
    }

    fn sse_event(piece: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [{ "delta": { "content": piece } }] })
        )
    }

    /// Serves `parts` as separate body chunks with a pause before each one.
    fn chunked_response(parts: Vec<Vec<u8>>, pause: Duration) -> Response {
        let stream = futures_util::stream::iter(parts).then(move |part| async move {
            tokio::time::sleep(pause).await;
            Ok::<_, std::io::Error>(part)
        });
        Response::builder()
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(Body::from_stream(stream))
            .unwrap()
    }

    async fn collect(llm: &OpenAiProvider) -> Result<String, ApiError> {
        let mut rx = llm
            .stream_chat(ChatRequest::new(vec![ChatMessage::user("Where?")]))
            .await?;
        let mut out = String::new();
        while let Some(item) = rx.recv().await {
            out.push_str(&item?);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn characters_split_across_chunks_are_decoded_whole() {
        let event = format!("{}data: [DONE]\n\n", sse_event("Université"));
        let bytes = event.into_bytes();
        // cut between the two bytes of 'é' (0xC3 0xA9)
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let parts = vec![bytes[..split].to_vec(), bytes[split..].to_vec()];

        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let parts = parts.clone();
                async move { chunked_response(parts, Duration::from_millis(20)) }
            }),
        );
        let llm = provider(spawn(app).await);

        assert_eq!(collect(&llm).await.unwrap(), "Université");
    }

    #[tokio::test]
    async fn long_stream_outlives_the_idle_timeout() {
        let mut parts: Vec<Vec<u8>> = ["Aivancity ", "is ", "in ", "Cachan."]
            .iter()
            .map(|piece| sse_event(piece).into_bytes())
            .collect();
        parts.push(b"data: [DONE]\n\n".to_vec());

        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let parts = parts.clone();
                async move { chunked_response(parts, Duration::from_millis(150)) }
            }),
        );
        let llm = OpenAiProvider::new(
            spawn(app).await,
            "sk-test".into(),
            "gpt-3.5-turbo".into(),
            Duration::from_millis(400),
        )
        .unwrap();

        // five chunks at 150ms each run well past the 400ms timeout
        assert_eq!(collect(&llm).await.unwrap(), "Aivancity is in Cachan.");
    }

    #[tokio::test]
    async fn error_status_is_an_upstream_error() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": { "message": "Incorrect API key provided" } })),
                )
                    .into_response()
            }),
        );
        let llm = provider(spawn(app).await);

        let err = llm
            .stream_chat(ChatRequest::new(vec![ChatMessage::user("hi")]))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Upstream(ref m) if m.contains("Incorrect API key")));
    }

    #[tokio::test]
    async fn chat_returns_message_content() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({ "choices": [{ "message": { "role": "assistant", "content": "Rating: 4" } }] }))
            }),
        );
        let llm = provider(spawn(app).await);

        let answer = llm
            .chat(ChatRequest::new(vec![ChatMessage::user("rate")]).with_temperature(0.0))
            .await
            .unwrap();
        assert_eq!(answer, "Rating: 4");
    }

    #[test]
    fn sse_lines_are_classified() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseLine::Done));
        assert!(matches!(parse_sse_line(": keep-alive"), SseLine::Skip));
        assert!(matches!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseLine::Skip
        ));
        assert!(matches!(
            parse_sse_line(r#"data: {"error":{"message":"overloaded"}}"#),
            SseLine::Error(ref m) if m == "overloaded"
        ));
    }

    #[test]
    fn missing_key_is_rejected() {
        assert!(OpenAiProvider::from_settings(&LlmSettings::default()).is_err());
    }
}
