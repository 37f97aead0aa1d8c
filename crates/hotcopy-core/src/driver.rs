//! Driving a session to completion
//!
//! [`run_to_completion`] loops `step` on the calling thread: it pauses
//! between successful steps so other users of the source get a turn, backs
//! off on busy/locked results per the [`RetryPolicy`](crate::config::RetryPolicy),
//! and reports progress after every step. The async driver in
//! [`offload`](crate::offload) shares the same decisions through
//! [`RunTracker`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::engine::BackupEngine;
use crate::error::{BackupError, BackupResult};
use crate::pages::Progress;
use crate::schema::SessionId;
use crate::session::{BackupSession, StepOutcome};

/// Summary of a backup that ran to completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReport {
    pub session_id: SessionId,
    /// Successful steps, including the final one
    pub steps: u64,
    /// Busy/locked steps that were retried
    pub retries: u32,
    /// Source page count observed by the final step
    pub page_count: u32,
    pub elapsed: Duration,
}

/// What a driver does after a step returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NextStep {
    Complete,
    Continue { pause: Duration },
    Retry { backoff: Duration },
}

/// Pacing and retry bookkeeping for one run
#[derive(Debug)]
pub(crate) struct RunTracker {
    config: BackupConfig,
    consecutive_retries: u32,
    total_retries: u32,
    started: Instant,
}

impl RunTracker {
    pub(crate) fn new(config: &BackupConfig) -> Self {
        Self {
            config: config.clone(),
            consecutive_retries: 0,
            total_retries: 0,
            started: Instant::now(),
        }
    }

    /// Decide the next move from a step result.
    ///
    /// Non-retryable errors pass through unchanged. A retryable error past
    /// the retry budget becomes [`BackupError::RetriesExhausted`]; the caller
    /// must then tear the session down.
    pub(crate) fn after_step(&mut self, result: BackupResult<StepOutcome>) -> BackupResult<NextStep> {
        match result {
            Ok(StepOutcome::Done) => Ok(NextStep::Complete),
            Ok(StepOutcome::MorePending) => {
                self.consecutive_retries = 0;
                Ok(NextStep::Continue {
                    pause: self.config.pause,
                })
            }
            Err(BackupError::Retryable(e)) => {
                if self.consecutive_retries >= self.config.retry.max_retries {
                    return Err(BackupError::RetriesExhausted {
                        attempts: self.consecutive_retries,
                        last: e,
                    });
                }
                self.consecutive_retries += 1;
                self.total_retries += 1;
                Ok(NextStep::Retry {
                    backoff: self.config.retry.backoff_for(self.consecutive_retries),
                })
            }
            Err(e) => Err(e),
        }
    }

    pub(crate) fn report(&self, session_id: SessionId, steps: u64, progress: Option<Progress>) -> BackupReport {
        BackupReport {
            session_id,
            steps,
            retries: self.total_retries,
            page_count: progress.map_or(0, |p| p.page_count),
            elapsed: self.started.elapsed(),
        }
    }

    pub(crate) fn config(&self) -> &BackupConfig {
        &self.config
    }
}

/// Open a session using the schema names from `config`.
pub fn start_backup<E: BackupEngine>(
    engine: E,
    source: &E::Store,
    destination: &E::Store,
    config: &BackupConfig,
) -> BackupResult<BackupSession<E>> {
    BackupSession::with_schemas(
        engine,
        source,
        &config.source_schema,
        destination,
        &config.destination_schema,
    )
}

/// Step `session` until the engine reports completion.
///
/// `on_progress` runs after every successful step. On a fatal error the
/// session has already released its cursor; when retries run out the
/// session is torn down here before the error is returned.
pub fn run_to_completion<E, F>(
    session: &mut BackupSession<E>,
    config: &BackupConfig,
    mut on_progress: F,
) -> BackupResult<BackupReport>
where
    E: BackupEngine,
    F: FnMut(&Progress),
{
    let mut tracker = RunTracker::new(config);
    info!(
        session_id = %session.id(),
        pages_per_step = %config.pages_per_step,
        "Running backup to completion"
    );

    loop {
        let result = session.step(config.pages_per_step);
        if result.is_ok()
            && let Some(progress) = session.progress()
        {
            on_progress(&progress);
        }

        match tracker.after_step(result) {
            Ok(NextStep::Complete) => {
                return Ok(tracker.report(session.id(), session.steps_taken(), session.progress()));
            }
            Ok(NextStep::Continue { pause }) => pause_for(pause),
            Ok(NextStep::Retry { backoff }) => pause_for(backoff),
            Err(e) => {
                if let BackupError::RetriesExhausted { .. } = e
                    && let Err(teardown) = session.finish()
                {
                    warn!(session_id = %session.id(), error = %teardown, "Teardown after exhausted retries failed");
                }
                return Err(e);
            }
        }
    }
}

fn pause_for(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::error::{EngineError, EngineErrorCode};

    fn config(max_retries: u32) -> BackupConfig {
        BackupConfig::builder()
            .pause(Duration::from_millis(5))
            .retry(RetryPolicy {
                max_retries,
                initial_backoff: Duration::from_millis(10),
                max_backoff: Duration::from_millis(40),
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_more_pending_pauses() {
        let mut tracker = RunTracker::new(&config(3));
        let next = tracker.after_step(Ok(StepOutcome::MorePending)).unwrap();
        assert_eq!(
            next,
            NextStep::Continue {
                pause: Duration::from_millis(5)
            }
        );
        assert_eq!(tracker.after_step(Ok(StepOutcome::Done)).unwrap(), NextStep::Complete);
    }

    #[test]
    fn test_retry_budget_counts_consecutive_failures() {
        let mut tracker = RunTracker::new(&config(2));
        let busy = || Err(BackupError::Retryable(EngineError::busy("database is locked")));

        assert_eq!(
            tracker.after_step(busy()).unwrap(),
            NextStep::Retry {
                backoff: Duration::from_millis(10)
            }
        );
        assert_eq!(
            tracker.after_step(busy()).unwrap(),
            NextStep::Retry {
                backoff: Duration::from_millis(20)
            }
        );

        // Progress resets the consecutive count.
        tracker.after_step(Ok(StepOutcome::MorePending)).unwrap();
        assert!(tracker.after_step(busy()).is_ok());
        assert!(tracker.after_step(busy()).is_ok());

        let err = tracker.after_step(busy()).unwrap_err();
        assert!(matches!(err, BackupError::RetriesExhausted { attempts: 2, .. }));
        assert_eq!(tracker.total_retries, 4);
    }

    #[test]
    fn test_fatal_errors_pass_through() {
        let mut tracker = RunTracker::new(&config(5));
        let err = tracker
            .after_step(Err(BackupError::Fatal(EngineError::new(
                EngineErrorCode::Full,
                "database or disk is full",
            ))))
            .unwrap_err();
        assert!(matches!(err, BackupError::Fatal(_)));
    }

    #[test]
    fn test_no_retry_policy_fails_immediately() {
        let mut tracker = RunTracker::new(&BackupConfig::builder().retry(RetryPolicy::none()).build().unwrap());
        let err = tracker
            .after_step(Err(BackupError::Retryable(EngineError::locked("locked"))))
            .unwrap_err();
        assert!(matches!(err, BackupError::RetriesExhausted { attempts: 0, .. }));
    }
}
