//! LLM client traits
//!
//! The assistant never trusts free text from a model: every completion is
//! requested against a [`ResponseSchema`] and validated before the caller
//! sees it. A schema failure is an [`LlmError::InvalidResponse`], which the
//! router surfaces as collaborator unavailability, not a crash.

use async_trait::async_trait;
use serde_json::Value;

use super::error::LlmError;

/// Expected JSON value kind for a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    String,
    Number,
    Bool,
    Array,
    Object,
}

impl JsonKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            JsonKind::String => value.is_string(),
            JsonKind::Number => value.is_number(),
            JsonKind::Bool => value.is_boolean(),
            JsonKind::Array => value.is_array(),
            JsonKind::Object => value.is_object(),
        }
    }
}

/// Structural expectation for a completion: the response must be a JSON
/// object carrying each required field with the right kind. Nullable
/// fields list themselves under `optional` instead.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub required: &'static [(&'static str, JsonKind)],
    pub optional: &'static [(&'static str, JsonKind)],
}

impl ResponseSchema {
    pub const fn new(name: &'static str, required: &'static [(&'static str, JsonKind)]) -> Self {
        Self {
            name,
            required,
            optional: &[],
        }
    }

    pub const fn with_optional(
        name: &'static str,
        required: &'static [(&'static str, JsonKind)],
        optional: &'static [(&'static str, JsonKind)],
    ) -> Self {
        Self { name, required, optional }
    }

    /// Validate a parsed response against this schema
    pub fn validate(&self, value: &Value) -> Result<(), LlmError> {
        let obj = value
            .as_object()
            .ok_or_else(|| LlmError::InvalidResponse(format!("{}: response is not a JSON object", self.name)))?;

        for (field, kind) in self.required {
            match obj.get(*field) {
                None => {
                    return Err(LlmError::InvalidResponse(format!(
                        "{}: missing required field '{}'",
                        self.name, field
                    )));
                }
                Some(v) if !kind.matches(v) => {
                    return Err(LlmError::InvalidResponse(format!(
                        "{}: field '{}' has wrong type",
                        self.name, field
                    )));
                }
                Some(_) => {}
            }
        }

        for (field, kind) in self.optional {
            if let Some(v) = obj.get(*field)
                && !v.is_null()
                && !kind.matches(v)
            {
                return Err(LlmError::InvalidResponse(format!(
                    "{}: field '{}' has wrong type",
                    self.name, field
                )));
            }
        }

        Ok(())
    }
}

/// Text-generation capability consumed by the classifier, the adapter's
/// substitution path, and the response synthesizer.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Complete a prompt and return schema-validated JSON
    async fn complete_json(&self, prompt: &str, schema: &ResponseSchema) -> Result<Value, LlmError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Embedding capability consumed by the semantic search index
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a text into a dense vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Strip a markdown code fence if the model wrapped its JSON in one,
/// then parse.
pub(crate) fn parse_json_payload(content: &str) -> Result<Value, LlmError> {
    let trimmed = content.trim();
    let inner = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest)
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest)
    } else {
        trimmed
    };
    Ok(serde_json::from_str(inner.trim())?)
}

#[cfg(test)]
pub mod mock {
    //! Mock clients for testing

    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock LLM that replays canned JSON responses in order.
    /// Validates against the schema like a real client would.
    pub struct MockLlmClient {
        responses: Mutex<Vec<Result<Value, String>>>,
        pub call_count: AtomicUsize,
        pub latency: Option<Duration>,
    }

    impl MockLlmClient {
        pub fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                call_count: AtomicUsize::new(0),
                latency: None,
            }
        }

        /// A client whose every call fails
        pub fn failing(message: &str) -> Self {
            Self {
                responses: Mutex::new(vec![Err(message.to_string()); 16]),
                call_count: AtomicUsize::new(0),
                latency: None,
            }
        }

        /// A client that stalls long enough to trip any reasonable timeout
        pub fn slow(responses: Vec<Value>, latency: Duration) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Ok).collect()),
                call_count: AtomicUsize::new(0),
                latency: Some(latency),
            }
        }

        pub fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for MockLlmClient {
        async fn complete_json(&self, _prompt: &str, schema: &ResponseSchema) -> Result<Value, LlmError> {
            let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            let responses = self.responses.lock().unwrap();
            match responses.get(idx) {
                Some(Ok(value)) => {
                    schema.validate(value)?;
                    Ok(value.clone())
                }
                Some(Err(message)) => Err(LlmError::InvalidResponse(message.clone())),
                None => Err(LlmError::InvalidResponse("No more mock responses".to_string())),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    /// Deterministic bag-of-words embedder: texts sharing words get
    /// nearby vectors, so cosine ranking behaves sensibly in tests.
    pub struct MockEmbeddingClient {
        pub dims: usize,
    }

    impl Default for MockEmbeddingClient {
        fn default() -> Self {
            Self { dims: 32 }
        }
    }

    #[async_trait]
    impl EmbeddingClient for MockEmbeddingClient {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(crate::llm::hash_embed(text, self.dims))
        }

        fn name(&self) -> &str {
            "mock-embed"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn test_mock_replays_in_order() {
            let schema = ResponseSchema::new("test", &[("answer", JsonKind::String)]);
            let mock = MockLlmClient::new(vec![json!({"answer": "one"}), json!({"answer": "two"})]);

            let first = mock.complete_json("p", &schema).await.unwrap();
            assert_eq!(first["answer"], "one");
            let second = mock.complete_json("p", &schema).await.unwrap();
            assert_eq!(second["answer"], "two");
            assert_eq!(mock.calls(), 2);
        }

        #[tokio::test]
        async fn test_mock_exhaustion_errors() {
            let schema = ResponseSchema::new("test", &[("answer", JsonKind::String)]);
            let mock = MockLlmClient::new(vec![]);
            let err = mock.complete_json("p", &schema).await.unwrap_err();
            assert!(matches!(err, LlmError::InvalidResponse(_)));
        }

        #[tokio::test]
        async fn test_mock_validates_schema() {
            let schema = ResponseSchema::new("test", &[("answer", JsonKind::String)]);
            let mock = MockLlmClient::new(vec![json!({"wrong": 1})]);
            let err = mock.complete_json("p", &schema).await.unwrap_err();
            assert!(err.to_string().contains("missing required field"));
        }

        #[tokio::test]
        async fn test_mock_embedding_is_deterministic() {
            let embedder = MockEmbeddingClient::default();
            let a = embedder.embed("tomato pasta").await.unwrap();
            let b = embedder.embed("tomato pasta").await.unwrap();
            assert_eq!(a, b);
            assert_eq!(a.len(), 32);
        }
    }
}
