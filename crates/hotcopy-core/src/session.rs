//! Incremental backup session
//!
//! A [`BackupSession`] copies a live source database into a destination a
//! bounded number of pages at a time. The source stays open and usable
//! between steps.
//!
//! # Lifecycle
//!
//! ```text
//! Active --step, pages remain------> Active
//! Active --step, none left---------> Finished  (cursor released)
//! Active --step, fatal error-------> Failed    (cursor released)
//! Active --step, busy/locked-------> Active    (cursor still live)
//! Active --finish / drop-----------> Closed    (cursor released)
//! ```
//!
//! `Finished`, `Failed` and `Closed` are terminal. Teardown from a terminal
//! state is a no-op; stepping from one is an error.
//!
//! The cursor and the retaining references to both stores live inside the
//! `Active` state only, so leaving it releases all three together.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::engine::{BackupEngine, EngineStep};
use crate::error::{BackupError, BackupResult};
use crate::pages::{Progress, StepSize};
use crate::schema::{SchemaName, SessionId};

/// Observable state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Cursor is live; more steps may be issued.
    Active,
    /// The engine copied every page.
    Finished,
    /// A step failed permanently.
    Failed,
    /// Torn down by the caller before completion.
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Finished => write!(f, "finished"),
            SessionState::Failed => write!(f, "failed"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Result of a successful step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Every page has been copied and the cursor released.
    Done,
    /// Pages remain; call `step` again.
    MorePending,
}

impl StepOutcome {
    pub fn is_done(self) -> bool {
        matches!(self, StepOutcome::Done)
    }
}

enum Lifecycle<E: BackupEngine> {
    Active {
        cursor: E::Cursor,
        // Retained for the whole session so neither store can be closed
        // underneath the cursor.
        _source: E::Store,
        _destination: E::Store,
    },
    Finished,
    Failed,
    Closed,
}

impl<E: BackupEngine> Lifecycle<E> {
    fn state(&self) -> SessionState {
        match self {
            Lifecycle::Active { .. } => SessionState::Active,
            Lifecycle::Finished => SessionState::Finished,
            Lifecycle::Failed => SessionState::Failed,
            Lifecycle::Closed => SessionState::Closed,
        }
    }
}

/// An in-progress online backup between two open stores
pub struct BackupSession<E: BackupEngine> {
    id: SessionId,
    engine: E,
    lifecycle: Lifecycle<E>,
    progress: Option<Progress>,
    steps: u64,
}

impl<E: BackupEngine> BackupSession<E> {
    /// Start a backup of the `main` database of `source` into `destination`.
    pub fn new(engine: E, source: &E::Store, destination: &E::Store) -> BackupResult<Self> {
        Self::with_schemas(
            engine,
            source,
            &SchemaName::main(),
            destination,
            &SchemaName::main(),
        )
    }

    /// Start a backup between two named attached databases.
    ///
    /// Nothing is retained if the engine refuses the pairing.
    pub fn with_schemas(
        engine: E,
        source: &E::Store,
        source_schema: &SchemaName,
        destination: &E::Store,
        destination_schema: &SchemaName,
    ) -> BackupResult<Self> {
        let id = SessionId::generate();

        let cursor = engine
            .begin_backup(source, source_schema, destination, destination_schema)
            .map_err(|e| {
                warn!(session_id = %id, error = %e, "Engine refused to start backup");
                BackupError::Setup(e)
            })?;

        info!(
            session_id = %id,
            source_schema = %source_schema,
            destination_schema = %destination_schema,
            "Backup session started"
        );

        Ok(Self {
            id,
            engine,
            lifecycle: Lifecycle::Active {
                cursor,
                _source: source.clone(),
                _destination: destination.clone(),
            },
            progress: None,
            steps: 0,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.lifecycle.state()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Active { .. })
    }

    /// Number of steps that completed without error.
    pub fn steps_taken(&self) -> u64 {
        self.steps
    }

    /// Pages not yet copied, as of the last successful step.
    ///
    /// `None` until a step has completed.
    pub fn remaining(&self) -> Option<u32> {
        self.progress.map(|p| p.remaining)
    }

    /// Source page count, as of the last successful step.
    ///
    /// `None` until a step has completed.
    pub fn page_count(&self) -> Option<u32> {
        self.progress.map(|p| p.page_count)
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    /// Copy up to `pages` pages from source to destination.
    ///
    /// Blocks for the duration of the engine call. On [`StepOutcome::Done`]
    /// the cursor is released before this returns. A busy or locked engine
    /// yields [`BackupError::Retryable`] and leaves the session active; any
    /// other engine failure yields [`BackupError::Fatal`] and releases the
    /// cursor.
    pub fn step(&mut self, pages: StepSize) -> BackupResult<StepOutcome> {
        let state = self.lifecycle.state();
        let Lifecycle::Active { cursor, .. } = &mut self.lifecycle else {
            return Err(BackupError::TerminalState {
                state,
                operation: "step",
            });
        };

        match self.engine.backup_step(cursor, pages) {
            Ok(step) => {
                let progress = Progress::new(
                    self.engine.backup_remaining(cursor),
                    self.engine.backup_page_count(cursor),
                );
                self.progress = Some(progress);
                self.steps += 1;

                debug!(
                    session_id = %self.id,
                    pages = %pages,
                    remaining = progress.remaining,
                    page_count = progress.page_count,
                    "Backup step completed"
                );

                match step {
                    EngineStep::More => Ok(StepOutcome::MorePending),
                    EngineStep::Done => {
                        self.release(SessionState::Finished);
                        info!(
                            session_id = %self.id,
                            steps = self.steps,
                            page_count = progress.page_count,
                            "Backup finished"
                        );
                        Ok(StepOutcome::Done)
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(session_id = %self.id, error = %e, "Backup step hit a transient conflict");
                Err(BackupError::Retryable(e))
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "Backup step failed");
                self.release(SessionState::Failed);
                Err(BackupError::Fatal(e))
            }
        }
    }

    /// Release the cursor and both store references.
    ///
    /// A release error is returned, but the session is closed regardless
    /// and never touches the cursor again. Calling this on a session that is
    /// already finished, failed or closed does nothing.
    pub fn finish(&mut self) -> BackupResult<()> {
        if !self.is_active() {
            return Ok(());
        }
        // Store references are held until the cursor is gone.
        let Lifecycle::Active {
            cursor,
            _source,
            _destination,
        } = std::mem::replace(&mut self.lifecycle, Lifecycle::Closed)
        else {
            return Ok(());
        };

        info!(session_id = %self.id, steps = self.steps, "Backup session closed before completion");
        self.engine
            .backup_finish(cursor)
            .map_err(BackupError::Teardown)
    }

    /// Leave the active state after a step ended it.
    ///
    /// The step already determined the outcome, so an error from the
    /// release is only logged.
    fn release(&mut self, next: SessionState) {
        let terminal = match next {
            SessionState::Finished => Lifecycle::Finished,
            SessionState::Failed => Lifecycle::Failed,
            SessionState::Active | SessionState::Closed => Lifecycle::Closed,
        };

        if let Lifecycle::Active {
            cursor,
            _source,
            _destination,
        } = std::mem::replace(&mut self.lifecycle, terminal)
            && let Err(e) = self.engine.backup_finish(cursor)
        {
            debug!(
                session_id = %self.id,
                state = %next,
                error = %e,
                "Engine reported an error while releasing the backup cursor"
            );
        }
    }
}

impl<E: BackupEngine> Drop for BackupSession<E> {
    fn drop(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Err(e) = self.finish() {
            warn!(session_id = %self.id, error = %e, "Backup cursor release failed during drop");
        }
    }
}

impl<E: BackupEngine> fmt::Debug for BackupSession<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupSession")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("progress", &self.progress)
            .field("steps", &self.steps)
            .finish()
    }
}
