//! # Hotcopy Core
//!
//! Incremental online backup of a live database into another, a bounded
//! number of pages at a time.
//!
//! This crate holds the engine-agnostic pieces: the [`BackupEngine`] seam,
//! the [`BackupSession`] lifecycle wrapper, the error taxonomy, and the
//! blocking and async drivers that loop a session to completion. Concrete
//! engines live in their own crates.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod offload;
pub mod pages;
pub mod schema;
pub mod session;

pub use config::{BackupConfig, BackupConfigBuilder, ConfigError, RetryPolicy};
pub use driver::{BackupReport, run_to_completion, start_backup};
pub use engine::{BackupEngine, EngineStep};
pub use error::{BackupError, BackupResult, EngineError, EngineErrorCode};
pub use offload::AsyncBackup;
pub use pages::{Progress, StepSize, StepSizeError};
pub use schema::{SchemaName, SchemaNameError, SessionId};
pub use session::{BackupSession, SessionState, StepOutcome};
