//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors from language-model and embedding calls
#[derive(Error, Debug)]
pub enum LlmError {
    /// Rate limited by the provider, retry after the given duration
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Provider returned a non-success status
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// Network-level failure
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response did not contain usable content, or failed the
    /// expected-schema check
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The call exceeded its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// JSON payload could not be parsed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    /// Whether this error is a rate limit
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// Whether the request can be retried
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Network(_) => true,
            LlmError::Timeout(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Suggested wait before retrying, if known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
