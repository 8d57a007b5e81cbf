//! Complexity planner
//!
//! Tiers a turn's work deterministically from the classified intents
//! and the active constraint count, then lays out the ordered steps,
//! success criteria, and relaxation order. The plan performs no work;
//! the orchestrator executes intents and consults the plan's fallback
//! wording when a step degrades. Every plan is logged for audit.

use tracing::debug;

use crate::classifier::Intent;
use crate::domain::{Complexity, PlanStep, Preferences, StepTarget, TaskPlan};

/// Build the plan for one turn
pub fn plan_turn(intents: &[Intent], preferences: &Preferences) -> TaskPlan {
    let complexity = classify_complexity(intents, preferences);

    let mut ordered_steps = Vec::new();
    let mut success_criteria = Vec::new();
    let mut fallbacks: Vec<&'static str> = Vec::new();

    for intent in intents {
        match intent {
            Intent::MutatePantry { deltas } => {
                ordered_steps.push(PlanStep::new(
                    StepTarget::Inventory,
                    format!("apply {} signed pantry deltas", deltas.len()),
                ));
                success_criteria.push("mutation applied".to_string());
                push_unique(&mut fallbacks, "report a rejected mutation conversationally");
            }
            Intent::SearchRecipes { .. } => {
                ordered_steps.push(PlanStep::new(StepTarget::Inventory, "fetch pantry snapshot"));
                ordered_steps.push(PlanStep::new(StepTarget::SearchIndex, "embed query and fetch candidates"));
                ordered_steps.push(PlanStep::new(
                    StepTarget::Internal,
                    "rank candidates against pantry and preferences",
                ));
                ordered_steps.push(PlanStep::new(StepTarget::TextGeneration, "explain recommendations"));
                success_criteria.push("at least one candidate passes all hard filters".to_string());
                push_unique(&mut fallbacks, "keyword match when the semantic index is unavailable");
                push_unique(&mut fallbacks, "cached pantry snapshot when the inventory store is slow");
                push_unique(&mut fallbacks, "relax allow_missing by the configured increment once");
            }
            Intent::SelectRecommendation { .. } => {
                ordered_steps.push(PlanStep::new(StepTarget::Inventory, "fetch pantry snapshot"));
                ordered_steps.push(PlanStep::new(
                    StepTarget::SubstitutionCatalog,
                    "look up substitutions for missing ingredients",
                ));
                ordered_steps.push(PlanStep::new(StepTarget::Internal, "adapt selected recipe to pantry"));
                ordered_steps.push(PlanStep::new(
                    StepTarget::Internal,
                    "re-check adapted recipe against allergies and diet",
                ));
                ordered_steps.push(PlanStep::new(StepTarget::TextGeneration, "explain adaptation"));
                success_criteria.push("adapted recipe passes the constraint gate".to_string());
                push_unique(&mut fallbacks, "cached pantry snapshot when the inventory store is slow");
                push_unique(&mut fallbacks, "mark unmatched ingredients to-buy when no substitution source answers");
            }
            Intent::GeneralQuery => {
                ordered_steps.push(PlanStep::new(StepTarget::TextGeneration, "answer cooking question"));
                success_criteria.push("answer produced".to_string());
                push_unique(&mut fallbacks, "deterministic answer when text generation is unavailable");
            }
            Intent::Ambiguous { .. } => {
                ordered_steps.push(PlanStep::new(StepTarget::Internal, "ask clarifying question"));
            }
        }
    }

    let fallback_strategy = if fallbacks.is_empty() {
        "none".to_string()
    } else {
        fallbacks.join("; ")
    };

    let plan = TaskPlan {
        complexity,
        ordered_steps,
        success_criteria,
        fallback_strategy,
    };
    debug!(
        complexity = %plan.complexity,
        steps = plan.ordered_steps.len(),
        collaborators = plan.collaborator_count(),
        "plan_turn: built"
    );
    plan
}

/// Complexity tiering. Multi-intent turns and selections always plan at
/// full depth; a search grows with the number of active constraints.
fn classify_complexity(intents: &[Intent], preferences: &Preferences) -> Complexity {
    if intents.len() > 1 {
        return Complexity::Complex;
    }
    match intents.first() {
        Some(Intent::SelectRecommendation { .. }) => Complexity::Complex,
        Some(Intent::SearchRecipes { .. }) => {
            if preferences.constraint_count() == 0 {
                Complexity::Medium
            } else {
                Complexity::Complex
            }
        }
        _ => Complexity::Simple,
    }
}

fn push_unique(fallbacks: &mut Vec<&'static str>, entry: &'static str) {
    if !fallbacks.contains(&entry) {
        fallbacks.push(entry);
    }
}
