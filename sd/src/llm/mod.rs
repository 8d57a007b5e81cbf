//! LLM and embedding clients
//!
//! The text-generation collaborator is always consumed through the
//! [`LlmClient`] trait with an expected response schema. The `local`
//! provider runs with no network at all: completions report themselves
//! unavailable (rule-based fallbacks take over) and embeddings use a
//! deterministic bag-of-words hash.

mod client;
mod embeddings;
mod error;
mod openai;

pub use client::{EmbeddingClient, JsonKind, LlmClient, ResponseSchema};
pub use embeddings::OpenAIEmbeddings;
pub use error::LlmError;
pub use openai::OpenAIClient;

#[cfg(test)]
pub use client::mock;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::config::{EmbeddingConfig, LlmConfig};

/// Create an LLM client from configuration
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                LlmError::InvalidResponse(format!("environment variable {} is not set", config.api_key_env))
            })?;
            info!(model = %config.model, "Using OpenAI-compatible completion client");
            Ok(Arc::new(OpenAIClient::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
            )))
        }
        "local" => {
            info!("Using local provider: completions disabled, rule fallbacks active");
            Ok(Arc::new(LocalLlm))
        }
        other => Err(LlmError::InvalidResponse(format!("Unknown LLM provider: {}", other))),
    }
}

/// Create an embedding client from configuration
pub fn create_embedding_client(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingClient>, LlmError> {
    match config.provider.as_str() {
        "openai" | "openai-compatible" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                LlmError::InvalidResponse(format!("environment variable {} is not set", config.api_key_env))
            })?;
            info!(model = %config.model, "Using OpenAI-compatible embedding client");
            Ok(Arc::new(OpenAIEmbeddings::new(
                api_key,
                config.model.clone(),
                config.base_url.clone(),
            )))
        }
        "local" => {
            info!(dims = config.local_dims, "Using local hash embeddings");
            Ok(Arc::new(HashEmbedder { dims: config.local_dims }))
        }
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Completion client for offline operation. Every call reports
/// unavailability so callers exercise their deterministic fallbacks.
struct LocalLlm;

#[async_trait]
impl LlmClient for LocalLlm {
    async fn complete_json(&self, _prompt: &str, schema: &ResponseSchema) -> Result<Value, LlmError> {
        Err(LlmError::InvalidResponse(format!(
            "local provider has no completion capability (wanted schema '{}')",
            schema.name
        )))
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Offline embedding provider backed by [`hash_embed`]
struct HashEmbedder {
    dims: usize,
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(hash_embed(text, self.dims))
    }

    fn name(&self) -> &str {
        "local-hash"
    }
}

/// Deterministic bag-of-words embedding: each word bumps one dimension
/// chosen by hash, and the vector is L2-normalized. Texts sharing words
/// land near each other, which is all the offline mode promises.
pub fn hash_embed(text: &str, dims: usize) -> Vec<f32> {
    use std::hash::{Hash, Hasher};

    let mut v = vec![0.0f32; dims.max(1)];
    for word in text.to_lowercase().split_whitespace() {
        let word = crate::domain::normalize_name(word);
        if word.is_empty() {
            continue;
        }
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        word.hash(&mut hasher);
        let idx = (hasher.finish() % v.len() as u64) as usize;
        v[idx] += 1.0;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}
