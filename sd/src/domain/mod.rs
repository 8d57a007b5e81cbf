//! Domain types for the recipe assistant
//!
//! Value objects shared across the pipeline: ingredient normalization,
//! recipes, preferences, and per-turn task plans. No IO lives here.

mod diet;
mod ingredient;
mod plan;
mod preferences;
mod recipe;

pub use diet::{DietVerdict, diet_verdict};
pub use ingredient::{constraint_matches, normalize_name};
pub use plan::{Complexity, PlanStep, StepTarget, TaskPlan};
pub use preferences::{PreferenceDelta, Preferences, SkillLevel};
pub use recipe::{AdaptedIngredient, AdaptedRecipe, CandidateRecipe, Difficulty, Provenance, RankedRecommendation, RecipeIngredient};
