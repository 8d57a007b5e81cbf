//! Intent classification
//!
//! One message can carry several intents ("I bought chicken, what can I
//! make?"); classification returns them in processing order with any
//! preference changes the message stated. The text-generation
//! collaborator does the real work against a strict JSON schema; when
//! it fails, deterministic keyword rules keep the turn alive.

mod rules;

use std::sync::Arc;

use pantrystore::PantryDelta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::{normalize_name, PreferenceDelta};
use crate::llm::{JsonKind, LlmClient, LlmError, ResponseSchema};
use crate::prompts::{ClassifyContext, PromptLoader};
use crate::session::{ConversationState, Stage};

pub(crate) use rules::is_greeting;

/// What one message asks for, in processing order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Signed pantry changes
    MutatePantry { deltas: Vec<PantryDelta> },
    /// Recipe search with the query text
    SearchRecipes { query: String },
    /// 1-based pick from the pending recommendations
    SelectRecommendation { index: usize },
    /// A cooking question answered directly
    GeneralQuery,
    /// Could not tell; carries the clarifying question to ask
    Ambiguous { question: String },
}

impl Intent {
    /// Short name for events and logs
    pub fn name(&self) -> &'static str {
        match self {
            Intent::MutatePantry { .. } => "mutate_pantry",
            Intent::SearchRecipes { .. } => "search_recipes",
            Intent::SelectRecommendation { .. } => "select_recommendation",
            Intent::GeneralQuery => "general_query",
            Intent::Ambiguous { .. } => "ambiguous",
        }
    }
}

/// Classifier output for one message
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub intents: Vec<Intent>,
    pub preference_delta: PreferenceDelta,
    /// True when the keyword rules produced this instead of the model
    pub used_fallback: bool,
}

const CLASSIFY_SCHEMA: ResponseSchema = ResponseSchema::with_optional(
    "classify",
    &[("intents", JsonKind::Array)],
    &[("preferences", JsonKind::Object)],
);

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    prompts: PromptLoader,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: PromptLoader) -> Self {
        Self { llm, prompts }
    }

    /// Classify one message in the context of its session. Infallible:
    /// a model failure falls back to keyword rules, and a message
    /// neither understands comes back as an `Ambiguous` intent.
    pub async fn classify(&self, message: &str, state: &ConversationState) -> Classification {
        debug!(session_id = %state.session_id, stage = %state.stage, "classify: called");

        // A plain selection while options are on the table never needs
        // a model call.
        if state.stage == Stage::AwaitingSelection
            && let Some(index) = rules::parse_selection(message)
        {
            debug!(index, "classify: deterministic selection");
            return Classification {
                intents: vec![Intent::SelectRecommendation { index }],
                preference_delta: PreferenceDelta::default(),
                used_fallback: false,
            };
        }

        match self.classify_with_model(message, state).await {
            Ok(classification) => sanitize(classification),
            Err(e) => {
                warn!(error = %e, "classify: model path failed, using keyword rules");
                sanitize(rules::classify(message, state))
            }
        }
    }

    async fn classify_with_model(&self, message: &str, state: &ConversationState) -> eyre::Result<Classification> {
        let context = ClassifyContext {
            stage: state.stage.to_string(),
            pending_count: state.pending_recommendations.len(),
            preferences: serde_json::to_string(&state.preferences)?,
            message: message.to_string(),
        };
        let prompt = self.prompts.render("classify", &context)?;
        let value = self.llm.complete_json(&prompt, &CLASSIFY_SCHEMA).await?;
        Ok(parse_classification(&value)?)
    }
}

/// Parse the model's JSON into a [`Classification`]. Strict: one bad
/// intent rejects the whole response so the rules take over instead of
/// half-obeying the model.
fn parse_classification(value: &Value) -> Result<Classification, LlmError> {
    let raw_intents = value
        .get("intents")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse("classify: intents is not an array".to_string()))?;

    let mut intents = Vec::with_capacity(raw_intents.len());
    for raw in raw_intents {
        let intent: Intent = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::InvalidResponse(format!("classify: bad intent: {e}")))?;
        intents.push(intent);
    }

    let preference_delta = match value.get("preferences") {
        Some(v) if !v.is_null() => serde_json::from_value(v.clone())
            .map_err(|e| LlmError::InvalidResponse(format!("classify: bad preferences: {e}")))?,
        _ => PreferenceDelta::default(),
    };

    Ok(Classification {
        intents,
        preference_delta,
        used_fallback: false,
    })
}

/// Enforce the invariants both classification paths must satisfy:
/// delta names normalized, empty mutations dropped, pantry mutations
/// ordered before everything else, and never an empty intent list.
fn sanitize(mut classification: Classification) -> Classification {
    for intent in &mut classification.intents {
        if let Intent::MutatePantry { deltas } = intent {
            for delta in deltas.iter_mut() {
                delta.name = normalize_name(&delta.name);
            }
            deltas.retain(|d| !d.name.is_empty() && d.quantity.abs() > f64::EPSILON);
        }
    }
    classification
        .intents
        .retain(|i| !matches!(i, Intent::MutatePantry { deltas } if deltas.is_empty()));

    // Pantry changes always apply before anything that reads the
    // pantry; the sort is stable so same-kind intents keep their order.
    classification
        .intents
        .sort_by_key(|i| !matches!(i, Intent::MutatePantry { .. }));

    if classification.intents.is_empty() {
        classification.intents.push(Intent::Ambiguous {
            question: rules::CLARIFY_FALLBACK.to_string(),
        });
    }

    classification
}
