//! Durable state: the per-file progress ledger and the canonical result store
//!
//! Both live in one SQLite database. A single connection guarded by a mutex
//! serialises writers; every operation is a short statement so the lock is
//! never held across an await point.

mod ledger;
mod results;

use crate::error::StoreError;
use crate::models::{ClassificationResult, FileCursor};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Per-file progress cursor store
pub trait ProgressLedger: Send + Sync {
    /// Rows consumed so far for `path` (0 if never seen)
    fn get(&self, path: &str) -> Result<u64, StoreError>;

    /// Full cursor record for `path`, if one exists
    fn cursor(&self, path: &str) -> Result<Option<FileCursor>, StoreError>;

    /// Insert or update the cursor for `path`. `rows_done` never decreases.
    fn upsert(&self, path: &str, rows_done: u64, size: u64, mtime: i64) -> Result<(), StoreError>;

    /// Number of distinct paths ever tracked
    fn tracked_files(&self) -> Result<u64, StoreError>;
}

/// Append-only store of classification results
pub trait ResultStore: Send + Sync {
    /// Insert one result; returns the assigned sequence id
    fn insert(&self, result: &ClassificationResult) -> Result<i64, StoreError>;

    /// Total number of stored results
    fn count_results(&self) -> Result<u64, StoreError>;

    /// Number of stored results whose decision is ATTACK
    fn count_attacks(&self) -> Result<u64, StoreError>;
}

/// SQLite database holding both the ledger and the results table
pub struct StateDb {
    conn: Mutex<Connection>,
}

impl StateDb {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        let db = Self::from_connection(conn)?;
        info!(path = %path.display(), "Opened state database");
        Ok(db)
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                file_path TEXT PRIMARY KEY,
                rows_done INTEGER NOT NULL DEFAULT 0,
                last_size INTEGER NOT NULL DEFAULT 0,
                last_mtime INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at INTEGER NOT NULL,
                file_path TEXT,
                flow_index INTEGER,
                rf_prob REAL,
                rf_label TEXT,
                xgb_prob REAL,
                xgb_label TEXT,
                decision TEXT,
                payload_json TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_results_decision ON results(decision);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}
