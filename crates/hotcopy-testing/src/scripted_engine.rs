//! # Scriptable Backup Engine
//!
//! [`ScriptedEngine`] copies pages between [`MemoryStore`]s the way a real
//! page-level engine does, and lets a test inject failures at chosen steps,
//! slow steps down, and inspect the exact sequence of primitive calls.
//!
//! Behaviour mirrors a real engine where it matters to sessions:
//!
//! - only the `main` schema exists on either side
//! - source and destination must be different stores with the same page size
//! - a store can be the destination of one backup at a time
//! - a write to the source between steps restarts the copy from page zero
//! - a non-retryable step error is reported again by `backup_finish`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hotcopy_core::{
    BackupEngine, EngineError, EngineErrorCode, EngineStep, SchemaName, StepSize,
};
use tracing::debug;

use crate::memory_store::MemoryStore;

/// A primitive call observed by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Begin,
    Step(StepSize),
    Remaining,
    PageCount,
    Finish,
}

/// Engine-level state of one in-memory backup
#[derive(Debug)]
pub struct ScriptedCursor {
    source: MemoryStore,
    destination: MemoryStore,
    next_page: usize,
    page_count: usize,
    generation: u64,
    last_error: Option<EngineError>,
}

/// Page-copying engine with injectable failures and a call log
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    calls: Arc<Mutex<Vec<EngineCall>>>,
    step_failures: Arc<Mutex<HashMap<usize, EngineError>>>,
    steps_seen: Arc<AtomicUsize>,
    finish_failure: Option<EngineError>,
    step_delay: Option<Duration>,
    in_flight: Arc<AtomicUsize>,
    overlaps: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the step call with 0-based index `step_index`
    pub fn with_step_failure(self, step_index: usize, error: EngineError) -> Self {
        lock(&self.step_failures).insert(step_index, error);
        self
    }

    /// Fail `count` step calls as busy, starting at index `from_index`
    pub fn with_busy_steps(self, from_index: usize, count: usize) -> Self {
        for index in from_index..from_index + count {
            lock(&self.step_failures).insert(index, EngineError::busy("database is locked"));
        }
        self
    }

    /// Make every `backup_finish` report `error`
    pub fn with_finish_failure(mut self, error: EngineError) -> Self {
        self.finish_failure = Some(error);
        self
    }

    /// Sleep for `delay` inside every step
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = Some(delay);
        self
    }

    /// Every primitive call so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.calls).clone()
    }

    pub fn finish_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Finish))
    }

    pub fn step_count(&self) -> usize {
        self.count(|call| matches!(call, EngineCall::Step(_)))
    }

    /// Calls that started while another call was still running
    pub fn overlapping_calls(&self) -> usize {
        self.overlaps.load(Ordering::Acquire)
    }

    fn count(&self, predicate: impl Fn(&EngineCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    fn enter(&self, call: EngineCall) -> InFlight<'_> {
        if self.in_flight.fetch_add(1, Ordering::AcqRel) > 0 {
            self.overlaps.fetch_add(1, Ordering::AcqRel);
        }
        lock(&self.calls).push(call);
        InFlight(&self.in_flight)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn check_schema(schema: &SchemaName) -> Result<(), EngineError> {
    if schema.as_str() == "main" {
        Ok(())
    } else {
        Err(EngineError::new(
            EngineErrorCode::Error,
            format!("unknown database {}", schema),
        ))
    }
}

impl BackupEngine for ScriptedEngine {
    type Store = MemoryStore;
    type Cursor = ScriptedCursor;

    fn begin_backup(
        &self,
        source: &MemoryStore,
        source_schema: &SchemaName,
        destination: &MemoryStore,
        destination_schema: &SchemaName,
    ) -> Result<ScriptedCursor, EngineError> {
        let _in_flight = self.enter(EngineCall::Begin);

        check_schema(source_schema)?;
        check_schema(destination_schema)?;
        if source.same_store(destination) {
            return Err(EngineError::new(
                EngineErrorCode::Error,
                "source and destination must be distinct",
            ));
        }
        if source.page_size() != destination.page_size() {
            return Err(EngineError::new(
                EngineErrorCode::ReadOnly,
                format!(
                    "page size mismatch: source {} bytes, destination {} bytes",
                    source.page_size(),
                    destination.page_size()
                ),
            ));
        }
        if !destination.claim_backup_target() {
            return Err(EngineError::busy("destination is already the target of a backup"));
        }

        debug!(source = source.name(), destination = destination.name(), "Scripted backup started");
        Ok(ScriptedCursor {
            source: source.clone(),
            destination: destination.clone(),
            next_page: 0,
            page_count: 0,
            generation: source.generation(),
            last_error: None,
        })
    }

    fn backup_step(
        &self,
        cursor: &mut ScriptedCursor,
        pages: StepSize,
    ) -> Result<EngineStep, EngineError> {
        let _in_flight = self.enter(EngineCall::Step(pages));
        let index = self.steps_seen.fetch_add(1, Ordering::AcqRel);

        if let Some(delay) = self.step_delay {
            std::thread::sleep(delay);
        }

        if let Some(error) = lock(&self.step_failures).remove(&index) {
            if !error.is_retryable() {
                cursor.last_error = Some(error.clone());
            }
            return Err(error);
        }

        let generation = cursor.source.generation();
        if generation != cursor.generation {
            debug!(from_page = cursor.next_page, "Source changed; restarting copy");
            cursor.next_page = 0;
            cursor.generation = generation;
        }

        cursor.page_count = cursor.source.page_count();
        let limit = pages.limit().map_or(usize::MAX, |n| n as usize);
        let end = cursor.next_page.saturating_add(limit).min(cursor.page_count);
        let copied = cursor.source.read_range(cursor.next_page, end);
        cursor.destination.store_range(cursor.next_page, copied);
        cursor.next_page = end;

        if cursor.next_page >= cursor.page_count {
            cursor.destination.truncate(cursor.page_count);
            Ok(EngineStep::Done)
        } else {
            Ok(EngineStep::More)
        }
    }

    fn backup_remaining(&self, cursor: &ScriptedCursor) -> u32 {
        let _in_flight = self.enter(EngineCall::Remaining);
        u32::try_from(cursor.page_count.saturating_sub(cursor.next_page)).unwrap_or(u32::MAX)
    }

    fn backup_page_count(&self, cursor: &ScriptedCursor) -> u32 {
        let _in_flight = self.enter(EngineCall::PageCount);
        u32::try_from(cursor.page_count).unwrap_or(u32::MAX)
    }

    fn backup_finish(&self, cursor: ScriptedCursor) -> Result<(), EngineError> {
        let _in_flight = self.enter(EngineCall::Finish);
        cursor.destination.release_backup_target();

        if let Some(error) = &self.finish_failure {
            return Err(error.clone());
        }
        match cursor.last_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
