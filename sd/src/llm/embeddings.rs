//! OpenAI-compatible embeddings client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::client::EmbeddingClient;
use super::error::LlmError;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

pub struct OpenAIEmbeddings {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIEmbeddings {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    async fn send_once(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&json!({"model": self.model, "input": text}))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(LlmError::ApiError { status, message });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| LlmError::InvalidResponse("embedding response contained no data".to_string()))
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, backoff_ms = backoff, "embeddings: retrying");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.send_once(text).await {
                Ok(vector) => return Ok(vector),
                Err(err) if err.is_retryable() && attempt < MAX_RETRIES => {
                    warn!(attempt, error = %err, "embeddings: retryable failure");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("retries exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "openai-embeddings"
    }
}

// Response structures

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_response_parse() {
        let raw = r#"{"data": [{"embedding": [0.1, -0.2, 0.3]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.data[0].embedding.len(), 3);
    }

    #[test]
    fn test_empty_data_is_invalid() {
        let raw = r#"{"data": []}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.data.is_empty());
    }
}
