//! Error Types
//!
//! The error types are organized into focused submodules:
//! - `engine`: failures reported by the storage engine, with classification
//! - `backup`: session and driver errors built on top of engine failures

mod backup;
mod engine;

pub use backup::{BackupError, BackupResult};
pub use engine::{EngineError, EngineErrorCode};
