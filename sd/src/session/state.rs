//! Per-session conversation state
//!
//! The whole state is replaced atomically when a turn commits, so a
//! superseded turn can never leave a half-written session behind.

use chrono::{DateTime, Utc};
use pantrystore::PantryItem;
use serde::{Deserialize, Serialize};

use crate::domain::{Preferences, RankedRecommendation, TaskPlan};
use crate::error::TurnError;
use crate::session::Stage;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub session_id: String,
    pub stage: Stage,
    pub preferences: Preferences,
    /// Options shown to the user, in presentation order. Selection
    /// indexes are 1-based into this list.
    pub pending_recommendations: Vec<RankedRecommendation>,
    /// Last pantry snapshot this session saw. Serves as the degraded
    /// read when the inventory store is unavailable.
    pub cached_pantry: Vec<PantryItem>,
    /// Monotonic per-session turn counter. A commit only lands if the
    /// stored counter still matches the one handed out at turn start.
    pub turn_seq: u64,
    pub last_active: DateTime<Utc>,
    /// Query text of the most recent search, kept for relaxed retries
    pub last_query: Option<String>,
    /// Most recent turn's plan, kept for audit only
    pub last_plan: Option<TaskPlan>,
}

impl ConversationState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            stage: Stage::Initial,
            preferences: Preferences::default(),
            pending_recommendations: Vec::new(),
            cached_pantry: Vec::new(),
            turn_seq: 0,
            last_active: Utc::now(),
            last_query: None,
            last_plan: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    pub fn idle_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.last_active).num_seconds().max(0) as u64
    }

    /// Consistency check run at turn start. A session that fails here
    /// is reset rather than trusted.
    pub fn validate(&self) -> Result<(), TurnError> {
        if self.session_id.is_empty() {
            return Err(TurnError::SessionStateCorrupt { reason: "empty session id".into() });
        }
        if self.stage == Stage::AwaitingSelection && self.pending_recommendations.is_empty() {
            return Err(TurnError::SessionStateCorrupt {
                reason: "awaiting selection with no pending recommendations".into(),
            });
        }
        if !self.pending_recommendations.is_empty()
            && !matches!(self.stage, Stage::PresentingOptions | Stage::AwaitingSelection)
        {
            return Err(TurnError::SessionStateCorrupt {
                reason: format!("pending recommendations present in stage {}", self.stage),
            });
        }
        Ok(())
    }

    /// Clear conversational context but keep what would be unsafe to
    /// forget: allergies survive a reset, everything else starts over.
    /// The turn counter is preserved so stale commits from before the
    /// reset still lose.
    pub fn reset(&mut self) {
        let allergies = std::mem::take(&mut self.preferences.allergies);
        self.stage = Stage::Initial;
        self.preferences = Preferences { allergies, ..Preferences::default() };
        self.pending_recommendations.clear();
        self.cached_pantry.clear();
        self.last_query = None;
        self.last_plan = None;
        self.touch();
    }
}
