use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::Embedder;
use crate::core::errors::ApiError;

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = json!({
            "model": self.model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::upstream)?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Upstream(format!(
                "Embedding request failed ({}): {}",
                status, text
            )));
        }

        let payload: Value = res.json().await.map_err(ApiError::upstream)?;
        let data = payload["data"]
            .as_array()
            .ok_or_else(|| ApiError::Upstream("Embedding response has no data".to_string()))?;

        // entries carry an `index`; order by it rather than trusting array order
        let mut indexed: Vec<(usize, Vec<f32>)> = data
            .iter()
            .enumerate()
            .filter_map(|(pos, item)| {
                let values = item["embedding"].as_array()?;
                let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(pos);
                let vector = values
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                Some((index, vector))
            })
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        if indexed.len() != inputs.len() {
            return Err(ApiError::Upstream(format!(
                "Embedding response returned {} vectors for {} inputs",
                indexed.len(),
                inputs.len()
            )));
        }

        Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Json, Router};

    async fn spawn_mock() -> String {
        let app = Router::new().route(
            "/v1/embeddings",
            post(|Json(body): Json<Value>| async move {
                let count = body["input"].as_array().map(|a| a.len()).unwrap_or(0);
                let data: Vec<Value> = (0..count)
                    .rev()
                    .map(|i| json!({ "index": i, "embedding": [i as f32, 1.0] }))
                    .collect();
                Json(json!({ "data": data }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn vectors_follow_input_order() {
        let base = spawn_mock().await;
        let embedder = OpenAiEmbedder::new(base, "sk-test".into(), "text-embedding-3-small".into());

        let vectors = embedder
            .embed(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors, vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![2.0, 1.0]]);
    }
}
