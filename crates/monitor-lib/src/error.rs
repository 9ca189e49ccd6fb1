//! Error taxonomy for per-file processing and its collaborators

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure while processing a single file during a tick.
///
/// None of these abort the tick; the scheduler logs them and moves on to the
/// next file. Only `Store` and `Ledger` indicate that state may be behind the
/// sinks.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// File vanished or never stabilised; retried next tick
    #[error("file {0} is missing or still being written")]
    TransientRead(PathBuf),

    /// Content could not be parsed as a delimited table
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Scoring service failed for one chunk; the whole file is retried
    #[error("classification failed: {0}")]
    Classification(#[from] ClassifyError),

    /// Canonical result record could not be persisted
    #[error("result store insert failed: {0}")]
    Store(#[source] StoreError),

    /// Progress cursor could not be read or written
    #[error("progress ledger failure: {0}")]
    Ledger(#[source] StoreError),
}

impl ProcessError {
    /// Short machine-friendly name for logs and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessError::TransientRead(_) => "transient_read",
            ProcessError::Parse { .. } => "parse",
            ProcessError::Classification(_) => "classification",
            ProcessError::Store(_) => "store",
            ProcessError::Ledger(_) => "ledger",
        }
    }
}

/// Failure of the external scoring capability
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("model {model} did not answer within {timeout:?}")]
    Timeout { model: String, timeout: Duration },

    #[error("model {model} returned {got} rows, expected {expected}")]
    ShapeMismatch {
        model: String,
        expected: usize,
        got: usize,
    },

    #[error("model {model} inference error: {message}")]
    Inference { model: String, message: String },

    #[error("scoring task for model {model} panicked or was cancelled")]
    Join { model: String },
}

/// Failure of the SQLite-backed ledger or result store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}

/// Failure sending to the remote log aggregator (always swallowed by the dispatcher)
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("aggregator i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("aggregator send timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode aggregator payload: {0}")]
    Encode(#[from] serde_json::Error),
}
