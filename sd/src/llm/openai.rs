//! OpenAI-compatible chat completions client
//!
//! Works against any endpoint speaking the `/chat/completions` protocol.
//! Retries transient failures with exponential backoff and honors
//! Retry-After on 429s.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use super::client::{LlmClient, ResponseSchema, parse_json_payload};
use super::error::LlmError;

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

fn should_retry(err: &LlmError) -> bool {
    match err {
        LlmError::RateLimited { .. } => true,
        LlmError::Network(_) => true,
        LlmError::Timeout(_) => true,
        LlmError::ApiError { status, .. } => is_retryable_status(*status),
        _ => false,
    }
}

pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }

    fn build_request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.0,
            "response_format": {"type": "json_object"},
        })
    }

    async fn send_once(&self, body: &Value) -> Result<Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(LlmError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !(200..300).contains(&status) {
            let message = response.text().await.unwrap_or_else(|_| "<no body>".to_string());
            return Err(LlmError::ApiError { status, message });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no choices".to_string()))?;

        parse_json_payload(&content)
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete_json(&self, prompt: &str, schema: &ResponseSchema) -> Result<Value, LlmError> {
        let body = self.build_request_body(prompt);
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, backoff_ms = backoff, "openai: retrying");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.send_once(&body).await {
                Ok(value) => {
                    schema.validate(&value)?;
                    return Ok(value);
                }
                Err(err) if should_retry(&err) && attempt < MAX_RETRIES => {
                    warn!(attempt, error = %err, "openai: retryable failure");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("retries exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// Response structures

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
