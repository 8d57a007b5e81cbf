//! Response synthesizer
//!
//! Assembles the structured payload a client renders and the short
//! natural-language explanation that rides along with it. The payload
//! is deterministic; the explanation is advisory and comes from the
//! text-generation collaborator when available, with a templated
//! fallback so a model outage never blanks the response.

use pantrystore::PantryItem;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{AdaptedRecipe, Provenance, RankedRecommendation};
use crate::llm::{JsonKind, ResponseSchema};
use crate::prompts::{ExplainContext, PromptLoader};
use crate::router::Router;

const EXPLAIN_SCHEMA: ResponseSchema = ResponseSchema::new("explain", &[("explanation", JsonKind::String)]);

/// The machine-readable half of a turn response, keyed by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuredPayload {
    PantrySummary {
        items: Vec<PantryItem>,
        expiring: Vec<PantryItem>,
    },
    Recommendations {
        recommendations: Vec<RankedRecommendation>,
        relaxed: bool,
    },
    AdaptedRecipe {
        recipe: AdaptedRecipe,
    },
    TextAnswer {
        text: String,
    },
    Clarification {
        question: String,
    },
    NoSafeMatch {
        shopping_list: Vec<String>,
    },
    ViolationReport {
        violations: Vec<String>,
    },
}

impl StructuredPayload {
    /// Stable tag, identical to the serialized `kind` field
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PantrySummary { .. } => "pantry_summary",
            Self::Recommendations { .. } => "recommendations",
            Self::AdaptedRecipe { .. } => "adapted_recipe",
            Self::TextAnswer { .. } => "text_answer",
            Self::Clarification { .. } => "clarification",
            Self::NoSafeMatch { .. } => "no_safe_match",
            Self::ViolationReport { .. } => "violation_report",
        }
    }
}

/// Produces the explanation half of a response
pub struct Synthesizer {
    prompts: PromptLoader,
}

impl Synthesizer {
    pub fn new(prompts: PromptLoader) -> Self {
        Self { prompts }
    }

    /// Explain a payload to the user. Result-bearing payloads get one
    /// advisory model call; questions, plain answers, and violation
    /// reports are already text and stay deterministic.
    pub async fn explain(&self, payload: &StructuredPayload, router: &Router) -> String {
        let fallback = fallback_explanation(payload);

        if !matches!(
            payload,
            StructuredPayload::PantrySummary { .. }
                | StructuredPayload::Recommendations { .. }
                | StructuredPayload::AdaptedRecipe { .. }
                | StructuredPayload::NoSafeMatch { .. }
        ) {
            return fallback;
        }

        let Ok(summary) = serde_json::to_string(payload) else {
            return fallback;
        };
        let prompt = match self.prompts.render("explain", &ExplainContext { summary }) {
            Ok(prompt) => prompt,
            Err(err) => {
                debug!(%err, "explain prompt failed to render");
                return fallback;
            }
        };

        match router.generate_json(&prompt, &EXPLAIN_SCHEMA).await {
            Ok(value) => value
                .get("explanation")
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(fallback),
            Err(err) => {
                debug!(%err, kind = payload.kind(), "explanation degraded to template");
                fallback
            }
        }
    }
}

/// Deterministic explanation built from the payload alone. States the
/// facts a user needs even with the model offline: what is missing,
/// what expires, and where diet compliance could not be verified.
fn fallback_explanation(payload: &StructuredPayload) -> String {
    match payload {
        StructuredPayload::PantrySummary { items, expiring } => {
            let mut text = format!("Your pantry has {} item{}.", items.len(), plural(items.len()));
            if !expiring.is_empty() {
                let names: Vec<&str> = expiring.iter().map(|i| i.name.as_str()).collect();
                text.push_str(&format!(" Expiring soon: {}.", names.join(", ")));
            }
            text
        }
        StructuredPayload::Recommendations {
            recommendations,
            relaxed,
        } => {
            let mut text = String::from("Here are my top picks.");
            for (i, rec) in recommendations.iter().enumerate() {
                text.push_str(&format!(" {}. {}", i + 1, rec.recipe.title));
                if rec.missing_ingredients.is_empty() {
                    text.push_str(" uses only what you have");
                } else {
                    text.push_str(&format!(" is missing {}", rec.missing_ingredients.join(", ")));
                }
                if !rec.expiring_used.is_empty() {
                    text.push_str(&format!(" and uses up your expiring {}", rec.expiring_used.join(", ")));
                }
                if rec.diet_unverified {
                    text.push_str(" (diet compliance not verified from its listing)");
                }
                text.push('.');
            }
            if *relaxed {
                text.push_str(" I allowed a couple of extra missing ingredients to find these.");
            }
            text
        }
        StructuredPayload::AdaptedRecipe { recipe } => {
            let mut text = format!("{} adapted for {} servings.", recipe.title, recipe.servings);
            for ingredient in recipe.substituted() {
                if let Provenance::Substituted { original } = &ingredient.provenance {
                    text.push_str(&format!(" Swapped {} for {}.", original, ingredient.name));
                }
            }
            if !recipe.shopping_list.is_empty() {
                text.push_str(&format!(" You will need to buy: {}.", recipe.shopping_list.join(", ")));
            }
            if let Some(note) = &recipe.waste_note {
                text.push(' ');
                text.push_str(note);
            }
            text
        }
        StructuredPayload::TextAnswer { text } => text.clone(),
        StructuredPayload::Clarification { question } => question.clone(),
        StructuredPayload::NoSafeMatch { shopping_list } => {
            let mut text = String::from("No recipe fits your constraints and pantry right now.");
            if shopping_list.is_empty() {
                text.push_str(" Try adding items to your pantry or loosening a preference.");
            } else {
                text.push_str(&format!(
                    " Buying a few items would unlock the closest matches: {}.",
                    shopping_list.join(", ")
                ));
            }
            text
        }
        StructuredPayload::ViolationReport { violations } => {
            format!(
                "I can't show that recipe: {}. I can adapt it differently or pick another option.",
                violations.join("; ")
            )
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}
