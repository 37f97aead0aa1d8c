//! # Hotcopy
//!
//! Hotcopy copies a live database into a backup a few pages at a time, so
//! the source stays usable while the copy is in progress.
//!
//! ## Core Components
//!
//! - **[BackupSession]**: One source-to-destination copy, advanced with [`BackupSession::step`]
//! - **[BackupEngine]**: Seam to the storage engine that actually moves pages
//! - **[AsyncBackup]**: Runs steps on the blocking pool from async code
//! - **[run_to_completion]**: Blocking driver with pauses and busy/locked retries
//!
//! ## Quick Start
//!
//! ```rust
//! # #[cfg(feature = "sqlite")]
//! # {
//! use hotcopy::{BackupConfig, StepSize, start_backup, run_to_completion};
//! use hotcopy::sqlite::{SqliteEngine, SqliteStore, StoreConfig};
//!
//! let source = SqliteStore::open_in_memory(&StoreConfig::default()).unwrap();
//! source
//!     .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
//!     .unwrap();
//! let destination = SqliteStore::open_in_memory(&StoreConfig::default()).unwrap();
//!
//! let config = BackupConfig::builder()
//!     .pages_per_step(StepSize::pages(4).unwrap())
//!     .pause(std::time::Duration::ZERO)
//!     .build()
//!     .unwrap();
//! let mut session = start_backup(SqliteEngine, &source, &destination, &config).unwrap();
//! let report = run_to_completion(&mut session, &config, |_| {}).unwrap();
//! assert_eq!(report.page_count, source.page_count().unwrap());
//! # }
//! ```

// ============================================================================
// Module aliases for namespaced access
// ============================================================================

pub use hotcopy_core as core;

#[cfg(feature = "sqlite")]
pub use hotcopy_sqlite as sqlite;

#[cfg(feature = "testing")]
pub use hotcopy_testing as testing;

// ============================================================================
// Session and engine seam
// ============================================================================

pub use hotcopy_core::{
    BackupEngine, BackupSession, EngineStep, Progress, SessionState, StepOutcome, StepSize,
    StepSizeError,
};

pub use hotcopy_core::{SchemaName, SchemaNameError, SessionId};

// ============================================================================
// Errors
// ============================================================================

pub use hotcopy_core::{BackupError, BackupResult, EngineError, EngineErrorCode};

// ============================================================================
// Drivers and configuration
// ============================================================================

pub use hotcopy_core::{
    AsyncBackup, BackupConfig, BackupConfigBuilder, BackupReport, ConfigError, RetryPolicy,
    run_to_completion, start_backup,
};

#[cfg(feature = "sqlite")]
pub use hotcopy_sqlite::{SqliteBackup, SqliteEngine, SqliteStore, StoreConfig, StoreError};
