//! Event types for turn activity streaming
//!
//! These events represent all observable activity during a turn:
//! - Turn lifecycle (start, supersede, complete, fail)
//! - Classification and planning decisions
//! - Collaborator calls and their outcomes
//! - Ranking, adaptation, and constraint gate results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core event enum for session turn activity
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    // === Turn Lifecycle ===
    /// A turn has started processing
    TurnStarted {
        session_id: String,
        turn_seq: u64,
        message_summary: String,
    },
    /// A newer message arrived and this turn was cancelled
    TurnSuperseded { session_id: String, turn_seq: u64 },
    /// A turn finished and its state was committed
    TurnCompleted {
        session_id: String,
        turn_seq: u64,
        stage: String,
        payload_kind: String,
    },
    /// A turn ended in an error response
    TurnFailed {
        session_id: String,
        turn_seq: u64,
        kind: String,
        message: String,
    },

    // === Decisions ===
    /// The classifier produced intents for the message
    IntentClassified {
        session_id: String,
        turn_seq: u64,
        intents: Vec<String>,
        used_fallback: bool,
    },
    /// The planner chose a complexity tier and step list
    PlanBuilt {
        session_id: String,
        turn_seq: u64,
        complexity: String,
        steps: usize,
    },

    // === Collaborators ===
    /// A collaborator call finished (successfully or not)
    CollaboratorCalled {
        session_id: String,
        turn_seq: u64,
        target: String,
        success: bool,
        duration_ms: u64,
    },

    // === Pipeline Results ===
    /// The ranker produced (or failed to produce) recommendations
    CandidatesRanked {
        session_id: String,
        turn_seq: u64,
        candidates: usize,
        returned: usize,
        relaxed: bool,
    },
    /// A selected recipe was adapted to the pantry
    RecipeAdapted {
        session_id: String,
        turn_seq: u64,
        recipe_id: String,
        substitutions: usize,
        to_buy: usize,
    },
    /// The constraint gate checked an adapted recipe
    GateChecked {
        session_id: String,
        turn_seq: u64,
        passed: bool,
        violations: Vec<String>,
    },

    // === Session Lifecycle ===
    /// A session was evicted after idling past the timeout
    SessionEvicted { session_id: String, idle_secs: u64 },
    /// A session was reset to its initial state
    SessionReset { session_id: String },
}

impl TurnEvent {
    /// Get the session ID for this event
    pub fn session_id(&self) -> &str {
        match self {
            TurnEvent::TurnStarted { session_id, .. }
            | TurnEvent::TurnSuperseded { session_id, .. }
            | TurnEvent::TurnCompleted { session_id, .. }
            | TurnEvent::TurnFailed { session_id, .. }
            | TurnEvent::IntentClassified { session_id, .. }
            | TurnEvent::PlanBuilt { session_id, .. }
            | TurnEvent::CollaboratorCalled { session_id, .. }
            | TurnEvent::CandidatesRanked { session_id, .. }
            | TurnEvent::RecipeAdapted { session_id, .. }
            | TurnEvent::GateChecked { session_id, .. }
            | TurnEvent::SessionEvicted { session_id, .. }
            | TurnEvent::SessionReset { session_id } => session_id,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            TurnEvent::TurnStarted { .. } => "TurnStarted",
            TurnEvent::TurnSuperseded { .. } => "TurnSuperseded",
            TurnEvent::TurnCompleted { .. } => "TurnCompleted",
            TurnEvent::TurnFailed { .. } => "TurnFailed",
            TurnEvent::IntentClassified { .. } => "IntentClassified",
            TurnEvent::PlanBuilt { .. } => "PlanBuilt",
            TurnEvent::CollaboratorCalled { .. } => "CollaboratorCalled",
            TurnEvent::CandidatesRanked { .. } => "CandidatesRanked",
            TurnEvent::RecipeAdapted { .. } => "RecipeAdapted",
            TurnEvent::GateChecked { .. } => "GateChecked",
            TurnEvent::SessionEvicted { .. } => "SessionEvicted",
            TurnEvent::SessionReset { .. } => "SessionReset",
        }
    }
}

/// A timestamped event log entry for file persistence
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventLogEntry {
    /// Timestamp of the event
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    /// The event
    pub event: TurnEvent,
}

impl EventLogEntry {
    /// Create a new log entry with current timestamp
    pub fn new(event: TurnEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
