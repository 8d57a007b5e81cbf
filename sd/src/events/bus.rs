//! Event Bus - central pub/sub system for turn events
//!
//! The EventBus uses tokio broadcast channels to deliver events to all
//! subscribers with minimal latency. The orchestrator emits events,
//! consumers (file logger, chat UI) subscribe.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::types::TurnEvent;

/// Default channel capacity (events)
/// A busy session emits a handful of events per turn, so this buffers
/// thousands of turns for a slow subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Central event bus for turn activity streaming
///
/// Every significant action during a turn emits an event to this bus.
/// All consumers (file logger, chat UI) subscribe to receive events.
pub struct EventBus {
    tx: broadcast::Sender<TurnEvent>,
    #[allow(dead_code)]
    channel_capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            channel_capacity: capacity,
        }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all subscribers
    ///
    /// This is fire-and-forget: if there are no subscribers, the event is dropped.
    pub fn emit(&self, event: TurnEvent) {
        debug!(
            event_type = event.event_type(),
            session_id = event.session_id(),
            "EventBus::emit"
        );
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events
    ///
    /// Returns a receiver that will receive all events emitted after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Create an emitter handle for a specific session
    ///
    /// The emitter provides convenience methods for emitting events
    /// and automatically includes the session ID.
    pub fn emitter_for(&self, session_id: impl Into<String>) -> TurnEmitter {
        let session_id = session_id.into();
        debug!(%session_id, "EventBus::emitter_for: creating emitter");
        TurnEmitter {
            tx: self.tx.clone(),
            session_id,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Handle for components to emit events without owning the bus
///
/// TurnEmitter is cheap to clone and provides convenience methods
/// for emitting events with a pre-set session ID.
#[derive(Clone)]
pub struct TurnEmitter {
    tx: broadcast::Sender<TurnEvent>,
    session_id: String,
}

impl TurnEmitter {
    /// Get the session ID this emitter is bound to
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Emit a raw event
    pub fn emit(&self, event: TurnEvent) {
        debug!(event_type = event.event_type(), "TurnEmitter::emit");
        let _ = self.tx.send(event);
    }

    // === Convenience methods ===

    /// Emit a turn started event
    pub fn turn_started(&self, turn_seq: u64, message: &str) {
        // Only a prefix goes into the event stream
        let message_summary: String = message.chars().take(120).collect();
        self.emit(TurnEvent::TurnStarted {
            session_id: self.session_id.clone(),
            turn_seq,
            message_summary,
        });
    }

    /// Emit a turn superseded event
    pub fn turn_superseded(&self, turn_seq: u64) {
        self.emit(TurnEvent::TurnSuperseded {
            session_id: self.session_id.clone(),
            turn_seq,
        });
    }

    /// Emit a turn completed event
    pub fn turn_completed(&self, turn_seq: u64, stage: &str, payload_kind: &str) {
        self.emit(TurnEvent::TurnCompleted {
            session_id: self.session_id.clone(),
            turn_seq,
            stage: stage.to_string(),
            payload_kind: payload_kind.to_string(),
        });
    }

    /// Emit a turn failed event
    pub fn turn_failed(&self, turn_seq: u64, kind: &str, message: &str) {
        self.emit(TurnEvent::TurnFailed {
            session_id: self.session_id.clone(),
            turn_seq,
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    /// Emit an intent classified event
    pub fn intent_classified(&self, turn_seq: u64, intents: Vec<String>, used_fallback: bool) {
        self.emit(TurnEvent::IntentClassified {
            session_id: self.session_id.clone(),
            turn_seq,
            intents,
            used_fallback,
        });
    }

    /// Emit a plan built event
    pub fn plan_built(&self, turn_seq: u64, complexity: &str, steps: usize) {
        self.emit(TurnEvent::PlanBuilt {
            session_id: self.session_id.clone(),
            turn_seq,
            complexity: complexity.to_string(),
            steps,
        });
    }

    /// Emit a collaborator called event
    pub fn collaborator_called(&self, turn_seq: u64, target: &str, success: bool, duration_ms: u64) {
        self.emit(TurnEvent::CollaboratorCalled {
            session_id: self.session_id.clone(),
            turn_seq,
            target: target.to_string(),
            success,
            duration_ms,
        });
    }

    /// Emit a candidates ranked event
    pub fn candidates_ranked(&self, turn_seq: u64, candidates: usize, returned: usize, relaxed: bool) {
        self.emit(TurnEvent::CandidatesRanked {
            session_id: self.session_id.clone(),
            turn_seq,
            candidates,
            returned,
            relaxed,
        });
    }

    /// Emit a recipe adapted event
    pub fn recipe_adapted(&self, turn_seq: u64, recipe_id: &str, substitutions: usize, to_buy: usize) {
        self.emit(TurnEvent::RecipeAdapted {
            session_id: self.session_id.clone(),
            turn_seq,
            recipe_id: recipe_id.to_string(),
            substitutions,
            to_buy,
        });
    }

    /// Emit a gate checked event
    pub fn gate_checked(&self, turn_seq: u64, passed: bool, violations: Vec<String>) {
        self.emit(TurnEvent::GateChecked {
            session_id: self.session_id.clone(),
            turn_seq,
            passed,
            violations,
        });
    }

    /// Emit a session evicted event
    pub fn session_evicted(&self, idle_secs: u64) {
        self.emit(TurnEvent::SessionEvicted {
            session_id: self.session_id.clone(),
            idle_secs,
        });
    }

    /// Emit a session reset event
    pub fn session_reset(&self) {
        self.emit(TurnEvent::SessionReset {
            session_id: self.session_id.clone(),
        });
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}
