//! Storage engine failures.
//!
//! Engines report failures as an [`EngineError`]: a classified result code
//! plus the engine's own diagnostic text. The classification decides whether
//! a failed step may be retried or must end the backup.

use std::fmt;

/// Strongly-typed engine result codes
///
/// The named variants mirror the result classes a page-copying engine
/// reports; anything else is carried verbatim in [`EngineErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorCode {
    /// Another connection holds a conflicting file lock.
    Busy,
    /// A conflicting lock is held within the same process.
    Locked,
    /// Disk I/O failure.
    IoErr,
    /// Destination storage is full.
    Full,
    /// Database image is malformed.
    Corrupt,
    /// Destination cannot be written.
    ReadOnly,
    /// Allocation failure inside the engine.
    NoMem,
    /// The engine API was used incorrectly.
    Misuse,
    /// Generic engine error.
    Error,
    /// Unclassified raw result code.
    Other(i32),
}

impl EngineErrorCode {
    /// Whether re-issuing the same step later may succeed without any
    /// corrective action.
    pub fn is_retryable(self) -> bool {
        matches!(self, EngineErrorCode::Busy | EngineErrorCode::Locked)
    }
}

impl fmt::Display for EngineErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErrorCode::Busy => write!(f, "busy"),
            EngineErrorCode::Locked => write!(f, "locked"),
            EngineErrorCode::IoErr => write!(f, "io-error"),
            EngineErrorCode::Full => write!(f, "full"),
            EngineErrorCode::Corrupt => write!(f, "corrupt"),
            EngineErrorCode::ReadOnly => write!(f, "read-only"),
            EngineErrorCode::NoMem => write!(f, "out-of-memory"),
            EngineErrorCode::Misuse => write!(f, "misuse"),
            EngineErrorCode::Error => write!(f, "error"),
            EngineErrorCode::Other(code) => write!(f, "code {}", code),
        }
    }
}

/// A failure reported by the storage engine, with its diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({code})")]
pub struct EngineError {
    pub code: EngineErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn new(code: EngineErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Shorthand for a busy failure.
    pub fn busy(message: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::Busy, message)
    }

    /// Shorthand for a locked failure.
    pub fn locked(message: impl Into<String>) -> Self {
        Self::new(EngineErrorCode::Locked, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}
