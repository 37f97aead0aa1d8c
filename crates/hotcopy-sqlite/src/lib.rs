//! # Hotcopy SQLite
//!
//! Online backup of a live SQLite database using SQLite's own incremental
//! backup API.
//!
//! ```rust
//! use hotcopy_core::{BackupSession, StepSize};
//! use hotcopy_sqlite::{SqliteEngine, SqliteStore, StoreConfig};
//!
//! let source = SqliteStore::open_in_memory(&StoreConfig::default()).unwrap();
//! source
//!     .execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);")
//!     .unwrap();
//! let destination = SqliteStore::open_in_memory(&StoreConfig::default()).unwrap();
//!
//! let mut session = BackupSession::new(SqliteEngine, &source, &destination).unwrap();
//! while !session.step(StepSize::pages(5).unwrap()).unwrap().is_done() {}
//! assert_eq!(session.remaining(), Some(0));
//! ```

pub mod engine;
pub mod error;
pub mod store;

pub use engine::{SqliteCursor, SqliteEngine};
pub use error::{StoreError, StoreResult};
pub use store::{SqliteStore, StoreConfig};

/// A backup session between two SQLite stores
pub type SqliteBackup = hotcopy_core::BackupSession<SqliteEngine>;
