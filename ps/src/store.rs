//! Core PantryStore implementation

use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Quantities within this distance of zero are treated as zero.
const EPSILON: f64 = 1e-9;

/// Errors produced by the pantry store
#[derive(Error, Debug)]
pub enum StoreError {
    /// A signed delta would take an item's quantity below zero.
    /// This is rejected, never floored at zero.
    #[error("Cannot remove {removed} '{name}': only {have} on hand")]
    BelowZero { name: String, have: f64, removed: f64 },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid expiration date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// A single ingredient the household has on hand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryItem {
    /// Normalized name, unique within a session
    pub name: String,
    /// Current quantity, always > 0 for stored rows
    pub quantity: f64,
    /// Optional display unit ("g", "cloves", ...)
    pub unit: Option<String>,
    /// Optional expiration date
    pub expires_on: Option<NaiveDate>,
}

impl PantryItem {
    pub fn new(name: impl Into<String>, quantity: f64) -> Self {
        Self {
            name: normalize_key(&name.into()),
            quantity,
            unit: None,
            expires_on: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_expiry(mut self, date: NaiveDate) -> Self {
        self.expires_on = Some(date);
        self
    }

    /// Days until this item expires relative to `today`.
    /// Negative means already expired; None means no date recorded.
    pub fn days_until_expiry(&self, today: NaiveDate) -> Option<i64> {
        self.expires_on.map(|d| (d - today).num_days())
    }
}

/// A signed quantity change keyed by item name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PantryDelta {
    pub name: String,
    /// Signed change: positive adds, negative removes
    pub quantity: f64,
    /// Unit to record when the item is created or has none
    pub unit: Option<String>,
    /// Expiration date to record when provided
    pub expires_on: Option<NaiveDate>,
}

impl PantryDelta {
    pub fn add(name: impl Into<String>, quantity: f64) -> Self {
        Self {
            name: name.into(),
            quantity,
            unit: None,
            expires_on: None,
        }
    }

    pub fn remove(name: impl Into<String>, quantity: f64) -> Self {
        Self {
            name: name.into(),
            quantity: -quantity,
            unit: None,
            expires_on: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_expiry(mut self, date: NaiveDate) -> Self {
        self.expires_on = Some(date);
        self
    }
}

/// The pantry inventory store
///
/// Opens a connection per operation so the handle is cheap to clone
/// and safe to share across threads.
pub struct PantryStore {
    db_path: PathBuf,
}

impl PantryStore {
    /// Open or create a pantry database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS pantry_items (
                session_id TEXT NOT NULL,
                name       TEXT NOT NULL,
                quantity   REAL NOT NULL,
                unit       TEXT,
                expires_on TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (session_id, name)
            );
            CREATE INDEX IF NOT EXISTS idx_pantry_expiry
                ON pantry_items (session_id, expires_on);",
        )?;

        debug!(?db_path, "Opened pantry store");
        Ok(Self { db_path })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.db_path)?)
    }

    /// All items for a session, ordered by name
    pub fn items(&self, session: &str) -> Result<Vec<PantryItem>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, quantity, unit, expires_on FROM pantry_items
             WHERE session_id = ?1 ORDER BY name ASC",
        )?;
        let rows = stmt.query_map(params![session], row_to_item)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Apply signed quantity deltas atomically: either every delta lands
    /// or none do. A delta that would take an item below zero aborts the
    /// whole batch with [`StoreError::BelowZero`]. An item whose quantity
    /// reaches exactly zero is removed.
    pub fn apply_delta(&self, session: &str, deltas: &[PantryDelta]) -> Result<Vec<PantryItem>, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = Utc::now().timestamp_millis();

        for delta in deltas {
            let key = normalize_key(&delta.name);
            let existing: Option<(f64, Option<String>, Option<String>)> = tx
                .query_row(
                    "SELECT quantity, unit, expires_on FROM pantry_items
                     WHERE session_id = ?1 AND name = ?2",
                    params![session, key],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;

            let have = existing.as_ref().map(|(q, _, _)| *q).unwrap_or(0.0);
            let next = have + delta.quantity;

            if next < -EPSILON {
                // Transaction drops here, rolling back earlier deltas
                return Err(StoreError::BelowZero {
                    name: key,
                    have,
                    removed: -delta.quantity,
                });
            }

            if next <= EPSILON {
                tx.execute(
                    "DELETE FROM pantry_items WHERE session_id = ?1 AND name = ?2",
                    params![session, key],
                )?;
                continue;
            }

            let unit = delta
                .unit
                .clone()
                .or_else(|| existing.as_ref().and_then(|(_, u, _)| u.clone()));
            let expires = delta
                .expires_on
                .map(|d| d.to_string())
                .or_else(|| existing.as_ref().and_then(|(_, _, e)| e.clone()));

            tx.execute(
                "INSERT INTO pantry_items (session_id, name, quantity, unit, expires_on, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (session_id, name)
                 DO UPDATE SET quantity = ?3, unit = ?4, expires_on = ?5, updated_at = ?6",
                params![session, key, next, unit, expires, now],
            )?;
        }

        tx.commit()?;
        info!(session, deltas = deltas.len(), "Applied pantry deltas");
        self.items(session)
    }

    /// Items expiring within `days` of today (inclusive), soonest first.
    /// Already-expired items are included so they surface in reports.
    pub fn expiring_within(&self, session: &str, days: u32) -> Result<Vec<PantryItem>, StoreError> {
        let cutoff = (Utc::now().date_naive() + chrono::Duration::days(days as i64)).to_string();
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, quantity, unit, expires_on FROM pantry_items
             WHERE session_id = ?1 AND expires_on IS NOT NULL AND expires_on <= ?2
             ORDER BY expires_on ASC, name ASC",
        )?;
        let rows = stmt.query_map(params![session, cutoff], row_to_item)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Remove an item entirely regardless of quantity.
    /// Returns true when a row was deleted.
    pub fn remove(&self, session: &str, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute(
            "DELETE FROM pantry_items WHERE session_id = ?1 AND name = ?2",
            params![session, normalize_key(name)],
        )?;
        Ok(n > 0)
    }

    /// Delete every item for a session. Returns the number removed.
    pub fn clear(&self, session: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        let n = conn.execute("DELETE FROM pantry_items WHERE session_id = ?1", params![session])?;
        info!(session, removed = n, "Cleared pantry");
        Ok(n)
    }

    /// All session ids with at least one item
    pub fn sessions(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT DISTINCT session_id FROM pantry_items ORDER BY session_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?);
        }
        Ok(sessions)
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<PantryItem> {
    let expires: Option<String> = row.get(3)?;
    Ok(PantryItem {
        name: row.get(0)?,
        quantity: row.get(1)?,
        unit: row.get(2)?,
        expires_on: expires.and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
    })
}

/// Case and whitespace normalization for item keys.
/// Culinary normalization (units, plurals) is the caller's business.
pub fn normalize_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
