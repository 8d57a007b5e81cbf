//! Sousdaemon - conversational pantry and recipe assistant
//!
//! Sousdaemon keeps a household's pantry in SQLite and holds per-session
//! conversations about it: what is on hand, what expires soon, and what
//! to cook tonight. Each turn flows through a fixed pipeline so every
//! recommendation can be audited after the fact.
//!
//! # Core Concepts
//!
//! - **One Turn, One Task**: Each message is classified, planned, routed,
//!   ranked, adapted, and gated before anything reaches the user
//! - **State in the Session**: Conversation stage, preferences, and the
//!   cached pantry snapshot persist per session, not per request
//! - **Constraints Are Checked, Not Promised**: A final safety gate
//!   re-verifies every adapted recipe against allergies and diets
//! - **Newest Message Wins**: A fresh message in a session supersedes the
//!   turn still in flight
//!
//! # Modules
//!
//! - [`orchestrator`] - Per-session turn pipeline and supersede handling
//! - [`classifier`] - Intent classification with a rules fallback
//! - [`ranker`] - Hard constraint filters and composite scoring
//! - [`adapter`] - Servings scaling and pantry-aware substitution
//! - [`gate`] - Final allergy and diet verification
//! - [`collaborators`] - Pantry store, recipe index, substitution catalog
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod adapter;
pub mod classifier;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod gate;
pub mod llm;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod ranker;
pub mod router;
pub mod session;
pub mod synthesizer;

// Re-export commonly used types
pub use adapter::{AdaptSource, RecipeAdapter};
pub use classifier::{Classification, Intent, IntentClassifier};
pub use config::{Config, LlmConfig};
pub use domain::{
    AdaptedIngredient, AdaptedRecipe, CandidateRecipe, Difficulty, PreferenceDelta, Preferences, Provenance,
    RankedRecommendation, RecipeIngredient, SkillLevel, TaskPlan,
};
pub use error::TurnError;
pub use llm::{EmbeddingClient, LlmClient, LlmError, create_client, create_embedding_client};
pub use orchestrator::{Orchestrator, TurnRequest, TurnResponse};
pub use planner::plan_turn;
pub use ranker::{RankOutcome, rank};
pub use router::{MutationOutcome, PantryRead, Router, SearchRead};
pub use session::{ConversationState, SessionError, SessionManager, Stage, spawn_idle_sweeper};
pub use synthesizer::{StructuredPayload, Synthesizer};

// Events module re-exports
pub use events::{
    EventBus, EventLogEntry, EventLogger, TurnEmitter, TurnEvent, create_event_bus, read_session_events,
    spawn_event_logger,
};
