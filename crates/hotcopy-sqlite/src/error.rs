//! Store-level errors
//!
//! Backup failures travel as [`hotcopy_core::EngineError`]; these cover
//! opening and querying the stores themselves.

use std::path::PathBuf;

/// Errors raised while opening, configuring or querying a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database '{}': {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid database path '{}': {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Failed to configure SQLite: {0}")]
    Configure(#[source] rusqlite::Error),

    #[error("SQLite query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("Store '{label}' is the target of a running backup")]
    BackupInProgress { label: String },

    #[error("PRAGMA {pragma} returned out-of-range value {value}")]
    OutOfRange { pragma: &'static str, value: i64 },
}

pub type StoreResult<T> = Result<T, StoreError>;
