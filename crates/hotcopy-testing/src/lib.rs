//! # Hotcopy Testing
//!
//! Deterministic stand-ins for a storage engine, so session and driver
//! behaviour can be tested without touching disk.
//!
//! ## Usage
//!
//! ```rust
//! use hotcopy_core::{BackupSession, StepSize, StepOutcome};
//! use hotcopy_testing::{MemoryStore, ScriptedEngine};
//!
//! let source = MemoryStore::with_pages("source", 64, 10);
//! let destination = MemoryStore::new("destination", 64);
//! let engine = ScriptedEngine::new();
//!
//! let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();
//! let step = StepSize::pages(4).unwrap();
//! while session.step(step).unwrap() != StepOutcome::Done {}
//!
//! assert_eq!(destination.pages(), source.pages());
//! assert_eq!(engine.finish_count(), 1);
//! ```

/// Shared in-memory page stores
pub mod memory_store;
/// Page-copying engine with failure injection
pub mod scripted_engine;

pub use memory_store::MemoryStore;
pub use scripted_engine::{EngineCall, ScriptedCursor, ScriptedEngine};
