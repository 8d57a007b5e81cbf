//! Session layer: per-session conversation state behind an actor
//!
//! ```text
//! handle_message ──> SessionManager (actor)
//!                      ├── begin_turn   claim next turn counter
//!                      ├── commit_turn  whole-state replace, stale turns lose
//!                      └── sweep_idle   background eviction
//! ```

mod manager;
mod messages;
mod stage;
mod state;

pub use manager::{spawn_idle_sweeper, SessionManager};
pub use messages::{SessionCommand, SessionError, SessionResponse};
pub use stage::Stage;
pub use state::ConversationState;
