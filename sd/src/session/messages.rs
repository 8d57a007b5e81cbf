//! Session manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::session::ConversationState;

/// Errors from session operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Stale turn: commit carried seq {expected} but session is at {current}")]
    StaleTurn { expected: u64, current: u64 },

    #[error("Channel error")]
    ChannelError,
}

/// Response from session operations
pub type SessionResponse<T> = Result<T, SessionError>;

/// Commands sent to the SessionManager actor
#[derive(Debug)]
pub enum SessionCommand {
    /// Get or create the session, bump its turn counter, and hand back
    /// a snapshot stamped with the new counter value.
    BeginTurn {
        session_id: String,
        reply: oneshot::Sender<SessionResponse<ConversationState>>,
    },
    /// Replace the whole session state, but only if the stored turn
    /// counter still matches the snapshot's. A mismatch means a newer
    /// turn has begun and this one lost the race.
    CommitTurn {
        state: ConversationState,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    Get {
        session_id: String,
        reply: oneshot::Sender<SessionResponse<Option<ConversationState>>>,
    },
    /// Clear conversational context, keeping allergies and the turn
    /// counter.
    Reset {
        session_id: String,
        reply: oneshot::Sender<SessionResponse<()>>,
    },
    /// Remove the session entirely. Replies with whether it existed.
    Evict {
        session_id: String,
        reply: oneshot::Sender<SessionResponse<bool>>,
    },
    /// Evict every session idle longer than the timeout. Replies with
    /// the evicted (session_id, idle_secs) pairs.
    SweepIdle {
        idle_timeout_secs: u64,
        reply: oneshot::Sender<SessionResponse<Vec<(String, u64)>>>,
    },
    ActiveSessions {
        reply: oneshot::Sender<SessionResponse<Vec<String>>>,
    },

    // Shutdown
    Shutdown,
}
