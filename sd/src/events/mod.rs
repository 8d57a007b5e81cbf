//! Event Bus Architecture for Turn Observability
//!
//! This module provides the event system for visibility into turn
//! processing. Every significant action emits an event. All consumers
//! (file logger, chat UI) subscribe to the bus.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       EVENT BUS                             │
//! │            (tokio::sync::broadcast channel)                 │
//! └─────────────────────────────────────────────────────────────┘
//!         ↑               ↑               ↑               ↑
//!    Orchestrator    Classifier       Router          Gate
//!    emits:          emits:           emits:          emits:
//!    - TurnStarted   - Intent-        - Collaborator- - GateChecked
//!    - TurnCompleted   Classified       Called
//!    - TurnFailed
//!
//!         ↓               ↓               ↓
//! ┌───────────┐   ┌───────────┐   ┌───────────┐
//! │ File Log  │   │ Chat UI   │   │ (future)  │
//! │ .jsonl    │   │ streaming │   │           │
//! └───────────┘   └───────────┘   └───────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use sousdaemon::events::{EventBus, TurnEvent};
//! use std::sync::Arc;
//!
//! let event_bus = Arc::new(EventBus::with_default_capacity());
//!
//! // Get emitter for a specific session
//! let emitter = event_bus.emitter_for("kitchen-1");
//! emitter.turn_started(1, "what can I make tonight?");
//!
//! // Subscribe to events (for loggers, UIs)
//! let mut rx = event_bus.subscribe();
//! while let Ok(event) = rx.recv().await {
//!     println!("Event: {:?}", event);
//! }
//! ```

mod bus;
mod logger;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, TurnEmitter, create_event_bus};
pub use logger::{EventLogger, read_session_events, spawn_event_logger};
pub use types::{EventLogEntry, TurnEvent};
