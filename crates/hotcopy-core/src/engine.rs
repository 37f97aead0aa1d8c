//! Storage engine seam
//!
//! A [`BackupSession`](crate::session::BackupSession) is a stateful protocol
//! wrapper over exactly five engine primitives. Engines own page formats,
//! locking and the copy algorithm; the session owns ordering, progress
//! bookkeeping and cursor release.

use crate::error::EngineError;
use crate::pages::StepSize;
use crate::schema::SchemaName;

/// Result of a single successful engine step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStep {
    /// Every page has been copied.
    Done,
    /// Pages remain to be copied.
    More,
}

/// The five primitives a storage engine exposes for online backup.
///
/// `Store` is an open database handle. Cloning a store must produce another
/// reference to the same open database, so a session can hold it for as
/// long as the backup runs. `Cursor` is the engine-level state of one
/// in-progress backup; it is consumed by [`BackupEngine::backup_finish`]
/// so it cannot be released twice.
pub trait BackupEngine {
    type Store: Clone;
    type Cursor;

    /// Start copying `source_schema` of `source` into `destination_schema`
    /// of `destination`.
    fn begin_backup(
        &self,
        source: &Self::Store,
        source_schema: &SchemaName,
        destination: &Self::Store,
        destination_schema: &SchemaName,
    ) -> Result<Self::Cursor, EngineError>;

    /// Copy up to `pages` not-yet-copied pages. May block on I/O.
    fn backup_step(
        &self,
        cursor: &mut Self::Cursor,
        pages: StepSize,
    ) -> Result<EngineStep, EngineError>;

    /// Pages still to be copied as of the last step.
    fn backup_remaining(&self, cursor: &Self::Cursor) -> u32;

    /// Total pages in the source as of the last step.
    fn backup_page_count(&self, cursor: &Self::Cursor) -> u32;

    /// Release the cursor. Engines may report the failure of an earlier
    /// step here; the cursor is gone either way.
    fn backup_finish(&self, cursor: Self::Cursor) -> Result<(), EngineError>;
}
