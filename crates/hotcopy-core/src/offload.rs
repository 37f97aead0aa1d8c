//! Async driver
//!
//! Engine steps block on I/O, so [`AsyncBackup`] moves the session onto
//! tokio's blocking pool for each call and takes it back afterwards. Only
//! one call is ever in flight: `step` and `finish` take `&mut self`, and the
//! session is owned by the blocking task while it runs.
//!
//! ```rust,ignore
//! let session = BackupSession::new(engine, &source, &destination)?;
//! let mut backup = AsyncBackup::new(session).with_step_timeout(Some(Duration::from_secs(30)));
//! let report = backup.run(&config, |p| println!("{p}")).await?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::driver::{BackupReport, NextStep, RunTracker};
use crate::engine::BackupEngine;
use crate::error::{BackupError, BackupResult};
use crate::pages::{Progress, StepSize};
use crate::schema::SessionId;
use crate::session::{BackupSession, SessionState, StepOutcome};

/// A backup session driven from async code
pub struct AsyncBackup<E: BackupEngine> {
    id: SessionId,
    // `None` once a timed-out step abandoned the session to its task.
    session: Option<BackupSession<E>>,
    last_progress: Option<Progress>,
    steps_taken: u64,
    step_timeout: Option<Duration>,
}

impl<E> AsyncBackup<E>
where
    E: BackupEngine + Send + 'static,
    E::Store: Send + 'static,
    E::Cursor: Send + 'static,
{
    pub fn new(session: BackupSession<E>) -> Self {
        Self {
            id: session.id(),
            last_progress: session.progress(),
            steps_taken: session.steps_taken(),
            session: Some(session),
            step_timeout: None,
        }
    }

    /// Deadline for a single step.
    ///
    /// A step that overruns returns [`BackupError::Timeout`] and the session
    /// is closed; its cursor is released as soon as the engine call returns.
    #[must_use]
    pub fn with_step_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Closed, BackupSession::state)
    }

    pub fn progress(&self) -> Option<Progress> {
        self.session
            .as_ref()
            .and_then(BackupSession::progress)
            .or(self.last_progress)
    }

    /// Successful steps over the session's lifetime, including steps taken
    /// before it was handed to this driver.
    pub fn steps_taken(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(self.steps_taken, BackupSession::steps_taken)
    }

    /// Run one step on the blocking pool.
    pub async fn step(&mut self, pages: StepSize) -> BackupResult<StepOutcome> {
        let mut session = self.session.take().ok_or(BackupError::TerminalState {
            state: SessionState::Closed,
            operation: "step",
        })?;

        let abandoned = Arc::new(AtomicBool::new(false));
        let task_abandoned = Arc::clone(&abandoned);
        let id = self.id;
        let task = tokio::task::spawn_blocking(move || {
            let result = session.step(pages);
            if task_abandoned.load(Ordering::Acquire) {
                if let Err(e) = session.finish() {
                    warn!(session_id = %id, error = %e, "Teardown of abandoned backup failed");
                }
                info!(session_id = %id, "Abandoned backup step returned; session closed");
            }
            (session, result)
        });

        let joined = match self.step_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // If the task already checked the flag, dropping its
                    // output still releases the cursor through Drop.
                    abandoned.store(true, Ordering::Release);
                    warn!(session_id = %id, timeout = ?limit, "Backup step timed out; abandoning session");
                    return Err(BackupError::Timeout {
                        timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            },
            None => task.await,
        };

        let (session, result) =
            joined.map_err(|e| BackupError::TaskFailed(format!("Backup step join error: {}", e)))?;
        self.last_progress = session.progress();
        self.steps_taken = session.steps_taken();
        self.session = Some(session);
        result
    }

    /// Release the cursor on the blocking pool. No-op once terminal.
    pub async fn finish(&mut self) -> BackupResult<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        if !session.is_active() {
            self.session = Some(session);
            return Ok(());
        }

        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = session.finish();
            (session, result)
        })
        .await
        .map_err(|e| BackupError::TaskFailed(format!("Backup teardown join error: {}", e)))?;

        self.session = Some(session);
        result
    }

    /// Step until done, sleeping between steps without holding a thread.
    ///
    /// `config.step_timeout`, when set, overrides the timeout given to
    /// [`with_step_timeout`](Self::with_step_timeout).
    pub async fn run<F>(&mut self, config: &BackupConfig, mut on_progress: F) -> BackupResult<BackupReport>
    where
        F: FnMut(&Progress),
    {
        if config.step_timeout.is_some() {
            self.step_timeout = config.step_timeout;
        }
        let mut tracker = RunTracker::new(config);

        info!(
            session_id = %self.id,
            pages_per_step = %config.pages_per_step,
            "Running backup to completion"
        );

        loop {
            let result = self.step(tracker.config().pages_per_step).await;
            if result.is_ok()
                && let Some(progress) = self.progress()
            {
                on_progress(&progress);
            }

            match tracker.after_step(result) {
                Ok(NextStep::Complete) => return Ok(tracker.report(self.id, self.steps_taken(), self.progress())),
                Ok(NextStep::Continue { pause }) => sleep_for(pause).await,
                Ok(NextStep::Retry { backoff }) => sleep_for(backoff).await,
                Err(e) => {
                    if let BackupError::RetriesExhausted { .. } = e
                        && let Err(teardown) = self.finish().await
                    {
                        warn!(session_id = %self.id, error = %teardown, "Teardown after exhausted retries failed");
                    }
                    return Err(e);
                }
            }
        }
    }
}

impl<E: BackupEngine> std::fmt::Debug for AsyncBackup<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncBackup")
            .field("id", &self.id)
            .field("session", &self.session)
            .field("steps_taken", &self.steps_taken)
            .field("step_timeout", &self.step_timeout)
            .finish()
    }
}

async fn sleep_for(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}
