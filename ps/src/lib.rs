//! PantryStore - session-scoped ingredient inventory
//!
//! Stores what a household currently has on hand, one inventory per
//! conversation session, backed by a single SQLite file.
//!
//! # Architecture
//!
//! ```text
//! pantry.db
//! └── pantry_items
//!     ├── (session_id, name)   # primary key, name is normalized
//!     ├── quantity             # signed deltas applied transactionally
//!     ├── unit                 # optional display unit
//!     └── expires_on           # optional ISO date, drives urgency queries
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pantrystore::{PantryDelta, PantryStore};
//!
//! let store = PantryStore::open("pantry.db")?;
//! store.apply_delta("default", &[PantryDelta::add("tomatoes", 5.0)])?;
//! let urgent = store.expiring_within("default", 3)?;
//! ```

pub mod cli;
pub mod config;
mod store;

pub use store::{PantryDelta, PantryItem, PantryStore, StoreError, normalize_key};

/// Default window for "use it soon" reports (days)
pub const DEFAULT_EXPIRING_DAYS: u32 = 3;
