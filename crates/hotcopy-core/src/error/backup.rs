//! Backup session errors.
//!
//! Every failure a caller can observe from a session or a driver. The
//! variants follow the lifecycle: setup, stepping, teardown, and misuse of
//! a session that already reached a terminal state.

use super::engine::EngineError;
use crate::session::SessionState;

/// Errors surfaced by backup sessions and the drivers built on them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackupError {
    /// The engine refused to start a backup between the two stores.
    /// The session never became usable.
    #[error("Failed to start backup: {0}")]
    Setup(#[source] EngineError),

    /// The step hit a transient conflict; the cursor is still live and the
    /// step can be issued again later.
    #[error("Backup step hit a transient conflict: {0}")]
    Retryable(#[source] EngineError),

    /// The step failed permanently; the cursor has been released.
    #[error("Backup step failed: {0}")]
    Fatal(#[source] EngineError),

    /// Releasing the cursor reported an error. The session is closed anyway.
    #[error("Failed to release backup cursor: {0}")]
    Teardown(#[source] EngineError),

    /// An operation was issued on a session that can no longer perform it.
    #[error("Cannot {operation} a backup session in state '{state}'")]
    TerminalState {
        state: SessionState,
        operation: &'static str,
    },

    /// Transient conflicts persisted past the configured retry budget.
    #[error("Backup gave up after {attempts} retries: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: EngineError,
    },

    /// The host-level wait for a step exceeded its deadline.
    #[error("Backup step did not return within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The blocking task running a step could not be joined.
    #[error("Backup task failed: {0}")]
    TaskFailed(String),
}

impl BackupError {
    /// Whether the caller may retry the failed operation on the same session.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackupError::Retryable(_))
    }

    /// Whether the session that produced this error is now terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupError::Setup(_)
                | BackupError::Fatal(_)
                | BackupError::Teardown(_)
                | BackupError::TerminalState { .. }
                | BackupError::RetriesExhausted { .. }
                | BackupError::Timeout { .. }
                | BackupError::TaskFailed(_)
        )
    }

    /// The engine failure behind this error, if the engine produced it.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            BackupError::Setup(e)
            | BackupError::Retryable(e)
            | BackupError::Fatal(e)
            | BackupError::Teardown(e) => Some(e),
            BackupError::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }
}

/// Result alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;
