//! Inventory collaborator
//!
//! Wraps the pantrystore SQLite database behind an async trait. The
//! below-zero removal rule surfaces as its own variant because the
//! orchestrator answers it conversationally instead of failing the turn.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use pantrystore::{PantryDelta, PantryItem, PantryStore, StoreError};
use thiserror::Error;
use tracing::debug;

/// Inventory collaborator failures
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A removal asked for more than the pantry holds
    #[error("Cannot remove {removed} '{name}': only {have} on hand")]
    BelowZero { name: String, have: f64, removed: f64 },

    /// The store could not be reached or the call failed
    #[error("Pantry store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for InventoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::BelowZero { name, have, removed } => Self::BelowZero { name, have, removed },
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// Async access to a session's pantry
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Current pantry contents, sorted by name
    async fn items(&self, session_id: &str) -> Result<Vec<PantryItem>, InventoryError>;

    /// Apply a batch of signed deltas atomically, returning the updated pantry
    async fn apply_deltas(&self, session_id: &str, deltas: Vec<PantryDelta>) -> Result<Vec<PantryItem>, InventoryError>;

    /// Items expiring within `days` (including already expired), soonest first
    async fn expiring_within(&self, session_id: &str, days: u32) -> Result<Vec<PantryItem>, InventoryError>;
}

/// Production inventory backed by the pantrystore SQLite database
///
/// rusqlite is synchronous, so every call runs on the blocking pool.
pub struct SqlitePantry {
    store: Arc<PantryStore>,
}

impl SqlitePantry {
    pub fn new(store: Arc<PantryStore>) -> Self {
        Self { store }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, InventoryError> {
        debug!(path = %path.as_ref().display(), "SqlitePantry::open: called");
        let store = PantryStore::open(path)?;
        Ok(Self::new(Arc::new(store)))
    }
}

#[async_trait]
impl InventoryStore for SqlitePantry {
    async fn items(&self, session_id: &str) -> Result<Vec<PantryItem>, InventoryError> {
        let store = Arc::clone(&self.store);
        let session = session_id.to_string();
        run_blocking(move || store.items(&session)).await
    }

    async fn apply_deltas(&self, session_id: &str, deltas: Vec<PantryDelta>) -> Result<Vec<PantryItem>, InventoryError> {
        debug!(%session_id, count = deltas.len(), "SqlitePantry::apply_deltas: called");
        let store = Arc::clone(&self.store);
        let session = session_id.to_string();
        run_blocking(move || store.apply_delta(&session, &deltas)).await
    }

    async fn expiring_within(&self, session_id: &str, days: u32) -> Result<Vec<PantryItem>, InventoryError> {
        let store = Arc::clone(&self.store);
        let session = session_id.to_string();
        run_blocking(move || store.expiring_within(&session, days)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, InventoryError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| InventoryError::Unavailable(format!("pantry task failed: {}", e)))?
        .map_err(Into::into)
}
