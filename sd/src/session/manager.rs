//! SessionManager - actor owning all conversation state
//!
//! All session reads and writes flow through a single actor task, so
//! turn-counter checks and whole-state replacement are atomic without
//! locks. Concurrent turns for the same session race on the counter:
//! the last message to begin is the only one allowed to commit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::EventBus;
use crate::session::messages::{SessionCommand, SessionError, SessionResponse};
use crate::session::ConversationState;

/// Handle to the session actor. Cheap to clone; all clones talk to the
/// same underlying state.
#[derive(Clone)]
pub struct SessionManager {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionManager {
    /// Spawn the session actor and return a handle to it
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(rx));
        info!("SessionManager actor spawned");
        Self { tx }
    }

    /// Start a turn: get or create the session and claim the next turn
    /// counter value. The returned snapshot is the turn's working copy.
    pub async fn begin_turn(&self, session_id: &str) -> SessionResponse<ConversationState> {
        debug!(%session_id, "begin_turn: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::BeginTurn {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    /// Commit a finished turn by replacing the whole session state.
    /// Fails with [`SessionError::StaleTurn`] if a newer turn began
    /// after this one's snapshot was taken.
    pub async fn commit_turn(&self, state: ConversationState) -> SessionResponse<()> {
        debug!(session_id = %state.session_id, turn_seq = state.turn_seq, "commit_turn: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::CommitTurn { state, reply: reply_tx })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    pub async fn get(&self, session_id: &str) -> SessionResponse<Option<ConversationState>> {
        debug!(%session_id, "get: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Get {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    /// Reset a session's conversational context. Allergies and the
    /// turn counter survive.
    pub async fn reset(&self, session_id: &str) -> SessionResponse<()> {
        debug!(%session_id, "reset: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Reset {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    /// Remove a session entirely. Returns whether it existed.
    pub async fn evict(&self, session_id: &str) -> SessionResponse<bool> {
        debug!(%session_id, "evict: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::Evict {
                session_id: session_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    /// Evict all sessions idle longer than the timeout. Returns the
    /// evicted (session_id, idle_secs) pairs.
    pub async fn sweep_idle(&self, idle_timeout_secs: u64) -> SessionResponse<Vec<(String, u64)>> {
        debug!(idle_timeout_secs, "sweep_idle: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::SweepIdle {
                idle_timeout_secs,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    pub async fn active_sessions(&self) -> SessionResponse<Vec<String>> {
        debug!("active_sessions: called");
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(SessionCommand::ActiveSessions { reply: reply_tx })
            .await
            .map_err(|_| SessionError::ChannelError)?;
        reply_rx.await.map_err(|_| SessionError::ChannelError)?
    }

    /// Shutdown the actor
    pub async fn shutdown(&self) -> SessionResponse<()> {
        info!("shutdown: called");
        self.tx
            .send(SessionCommand::Shutdown)
            .await
            .map_err(|_| SessionError::ChannelError)?;
        Ok(())
    }
}

/// The actor loop. Owns the session map; processes commands one at a
/// time, which is what makes begin/commit atomic.
async fn actor_loop(mut rx: mpsc::Receiver<SessionCommand>) {
    info!("SessionManager actor_loop: started");
    let mut sessions: HashMap<String, ConversationState> = HashMap::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            SessionCommand::BeginTurn { session_id, reply } => {
                let state = sessions
                    .entry(session_id.clone())
                    .or_insert_with(|| ConversationState::new(session_id));
                state.turn_seq += 1;
                state.stage = state.stage.resume_stage();
                state.touch();
                let _ = reply.send(Ok(state.clone()));
            }
            SessionCommand::CommitTurn { state, reply } => {
                let result = match sessions.get_mut(&state.session_id) {
                    Some(current) if current.turn_seq == state.turn_seq => {
                        let mut committed = state;
                        committed.touch();
                        *current = committed;
                        Ok(())
                    }
                    Some(current) => Err(SessionError::StaleTurn {
                        expected: state.turn_seq,
                        current: current.turn_seq,
                    }),
                    None => Err(SessionError::NotFound(state.session_id.clone())),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Get { session_id, reply } => {
                let _ = reply.send(Ok(sessions.get(&session_id).cloned()));
            }
            SessionCommand::Reset { session_id, reply } => {
                let result = match sessions.get_mut(&session_id) {
                    Some(state) => {
                        state.reset();
                        Ok(())
                    }
                    None => Err(SessionError::NotFound(session_id)),
                };
                let _ = reply.send(result);
            }
            SessionCommand::Evict { session_id, reply } => {
                let _ = reply.send(Ok(sessions.remove(&session_id).is_some()));
            }
            SessionCommand::SweepIdle {
                idle_timeout_secs,
                reply,
            } => {
                let now = Utc::now();
                let expired: Vec<(String, u64)> = sessions
                    .iter()
                    .filter(|(_, state)| state.idle_secs(now) > idle_timeout_secs)
                    .map(|(id, state)| (id.clone(), state.idle_secs(now)))
                    .collect();
                for (id, _) in &expired {
                    sessions.remove(id);
                }
                let _ = reply.send(Ok(expired));
            }
            SessionCommand::ActiveSessions { reply } => {
                let mut ids: Vec<String> = sessions.keys().cloned().collect();
                ids.sort();
                let _ = reply.send(Ok(ids));
            }
            SessionCommand::Shutdown => {
                info!("SessionManager actor_loop: shutting down");
                break;
            }
        }
    }

    info!("SessionManager actor_loop: exited");
}

/// Spawn the background task that periodically evicts idle sessions
/// and reports each eviction on the event bus.
pub fn spawn_idle_sweeper(
    manager: SessionManager,
    bus: Arc<EventBus>,
    idle_timeout: Duration,
    sweep_interval: Duration,
) -> tokio::task::JoinHandle<()> {
    info!(
        idle_timeout_secs = idle_timeout.as_secs(),
        sweep_interval_secs = sweep_interval.as_secs(),
        "idle sweeper: spawned"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match manager.sweep_idle(idle_timeout.as_secs()).await {
                Ok(evicted) => {
                    for (session_id, idle_secs) in evicted {
                        debug!(%session_id, idle_secs, "idle sweeper: evicted session");
                        bus.emitter_for(&session_id).session_evicted(idle_secs);
                    }
                }
                Err(SessionError::ChannelError) => {
                    info!("idle sweeper: session manager gone, stopping");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "idle sweeper: sweep failed");
                }
            }
        }
    })
}
