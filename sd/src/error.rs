//! Turn-level error taxonomy
//!
//! Every collaborator failure is converted to one of these kinds at the
//! delegation router boundary. Nothing below the orchestrator crashes a
//! turn: each kind maps to a specific degraded or corrective response.

use thiserror::Error;

use crate::domain::StepTarget;

#[derive(Error, Debug)]
pub enum TurnError {
    /// The classifier could not confidently assign an intent.
    /// The orchestrator asks the clarifying question; state is unchanged.
    #[error("Could not determine intent: {question}")]
    ClassificationAmbiguous { question: String },

    /// A collaborator call timed out or errored and no fallback applied.
    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable { collaborator: StepTarget, reason: String },

    /// A hard filter or the quality gate found a constraint breach.
    /// Always fatal to presenting the offending recipe.
    #[error("Constraint violation: {}", violations.join("; "))]
    ConstraintViolation { violations: Vec<String> },

    /// Every candidate was eliminated, even after the one relaxation pass.
    #[error("No recipe passed the safety filters")]
    NoCandidatesFound { shopping_list: Vec<String> },

    /// A selection referenced an index that is out of range or arrived
    /// outside a selection stage. Handled like an ambiguous message.
    #[error("Selection {index} is not available ({available} options)")]
    InvalidSelection { index: usize, available: usize },

    /// A session invariant was violated; the session is reset rather
    /// than letting the corruption propagate.
    #[error("Session state corrupt: {reason}")]
    SessionStateCorrupt { reason: String },
}

impl TurnError {
    /// Stable tag for logs and events
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClassificationAmbiguous { .. } => "classification_ambiguous",
            Self::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::NoCandidatesFound { .. } => "no_candidates_found",
            Self::InvalidSelection { .. } => "invalid_selection",
            Self::SessionStateCorrupt { .. } => "session_state_corrupt",
        }
    }

    /// Whether the turn can still produce a useful (degraded or
    /// corrective) response rather than an error stage.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SessionStateCorrupt { .. })
    }
}
