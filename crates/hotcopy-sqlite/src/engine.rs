//! SQLite's online-backup API behind the [`BackupEngine`] seam
//!
//! Connections are opened without SQLite's internal mutexes, so every call
//! that touches both databases holds both store locks, always taken in the
//! same global order. While a backup runs, the source connection may be
//! used freely between steps; the destination belongs to the backup.

use std::ffi::{CStr, CString, c_int};
use std::fmt;
use std::ptr::NonNull;

use hotcopy_core::{
    BackupEngine, EngineError, EngineErrorCode, EngineStep, SchemaName, StepSize,
};
use rusqlite::ffi;
use tracing::{debug, trace};

use crate::store::SqliteStore;

/// Engine driving `sqlite3_backup_*`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteEngine;

/// One live `sqlite3_backup` object plus the stores it reads and writes
pub struct SqliteCursor {
    raw: NonNull<ffi::sqlite3_backup>,
    source: SqliteStore,
    destination: SqliteStore,
}

// SAFETY: the backup object is only stepped or finished while both
// connection locks are held, and it is never shared between threads.
unsafe impl Send for SqliteCursor {}

impl fmt::Debug for SqliteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCursor")
            .field("source", &self.source.label())
            .field("destination", &self.destination.label())
            .finish()
    }
}

fn code_from(rc: c_int) -> EngineErrorCode {
    match rc & 0xff {
        ffi::SQLITE_BUSY => EngineErrorCode::Busy,
        ffi::SQLITE_LOCKED => EngineErrorCode::Locked,
        ffi::SQLITE_IOERR => EngineErrorCode::IoErr,
        ffi::SQLITE_FULL => EngineErrorCode::Full,
        ffi::SQLITE_CORRUPT | ffi::SQLITE_NOTADB => EngineErrorCode::Corrupt,
        ffi::SQLITE_READONLY => EngineErrorCode::ReadOnly,
        ffi::SQLITE_NOMEM => EngineErrorCode::NoMem,
        ffi::SQLITE_MISUSE => EngineErrorCode::Misuse,
        ffi::SQLITE_ERROR => EngineErrorCode::Error,
        _ => EngineErrorCode::Other(rc),
    }
}

/// Error for a bare result code, described by SQLite's static text.
fn code_error(rc: c_int) -> EngineError {
    // SAFETY: sqlite3_errstr returns a static NUL-terminated string.
    let message = unsafe { CStr::from_ptr(ffi::sqlite3_errstr(rc)) }
        .to_string_lossy()
        .into_owned();
    EngineError::new(code_from(rc), message)
}

/// Error recorded on a connection by its last failed call.
///
/// # Safety
///
/// `handle` must be an open connection the caller has locked.
unsafe fn connection_error(handle: *mut ffi::sqlite3) -> EngineError {
    // SAFETY: guaranteed by the caller; errmsg's buffer is copied before
    // the lock is released.
    let (rc, message) = unsafe {
        (
            ffi::sqlite3_extended_errcode(handle),
            CStr::from_ptr(ffi::sqlite3_errmsg(handle))
                .to_string_lossy()
                .into_owned(),
        )
    };
    EngineError::new(code_from(rc), message)
}

fn schema_cstring(schema: &SchemaName) -> Result<CString, EngineError> {
    CString::new(schema.as_str()).map_err(|_| {
        EngineError::new(
            EngineErrorCode::Misuse,
            format!("schema name '{}' contains a NUL byte", schema),
        )
    })
}

impl BackupEngine for SqliteEngine {
    type Store = SqliteStore;
    type Cursor = SqliteCursor;

    fn begin_backup(
        &self,
        source: &SqliteStore,
        source_schema: &SchemaName,
        destination: &SqliteStore,
        destination_schema: &SchemaName,
    ) -> Result<SqliteCursor, EngineError> {
        if source.same_store(destination) {
            return Err(EngineError::new(
                EngineErrorCode::Error,
                "source and destination must be distinct",
            ));
        }
        let source_name = schema_cstring(source_schema)?;
        let destination_name = schema_cstring(destination_schema)?;

        if !destination.claim_backup_target() {
            return Err(EngineError::busy(format!(
                "{} is already the target of a backup",
                destination.label()
            )));
        }

        let raw = {
            let (dst_conn, src_conn) = destination.lock_pair(source);
            // SAFETY: both connections stay open and locked for the whole
            // block, and the schema names outlive the call.
            unsafe {
                let dst_handle = dst_conn.handle();
                let src_handle = src_conn.handle();
                let raw = ffi::sqlite3_backup_init(
                    dst_handle,
                    destination_name.as_ptr(),
                    src_handle,
                    source_name.as_ptr(),
                );
                match NonNull::new(raw) {
                    Some(raw) => Ok(raw),
                    None => Err(connection_error(dst_handle)),
                }
            }
        };

        match raw {
            Ok(raw) => {
                debug!(
                    source = source.label(),
                    destination = destination.label(),
                    "sqlite3_backup_init succeeded"
                );
                Ok(SqliteCursor {
                    raw,
                    source: source.clone(),
                    destination: destination.clone(),
                })
            }
            Err(e) => {
                destination.release_backup_target();
                Err(e)
            }
        }
    }

    fn backup_step(
        &self,
        cursor: &mut SqliteCursor,
        pages: StepSize,
    ) -> Result<EngineStep, EngineError> {
        let rc = {
            let (_dst, _src) = cursor.destination.lock_pair(&cursor.source);
            // SAFETY: the backup object is live until finish consumes the
            // cursor, and both of its connections are locked.
            unsafe { ffi::sqlite3_backup_step(cursor.raw.as_ptr(), pages.as_engine_arg()) }
        };
        trace!(rc, pages = %pages, "sqlite3_backup_step returned");

        match rc {
            ffi::SQLITE_OK => Ok(EngineStep::More),
            ffi::SQLITE_DONE => Ok(EngineStep::Done),
            rc => Err(code_error(rc)),
        }
    }

    fn backup_remaining(&self, cursor: &SqliteCursor) -> u32 {
        // SAFETY: reads a counter on a live backup object.
        let remaining = unsafe { ffi::sqlite3_backup_remaining(cursor.raw.as_ptr()) };
        u32::try_from(remaining).unwrap_or(0)
    }

    fn backup_page_count(&self, cursor: &SqliteCursor) -> u32 {
        // SAFETY: reads a counter on a live backup object.
        let page_count = unsafe { ffi::sqlite3_backup_pagecount(cursor.raw.as_ptr()) };
        u32::try_from(page_count).unwrap_or(0)
    }

    fn backup_finish(&self, cursor: SqliteCursor) -> Result<(), EngineError> {
        let SqliteCursor {
            raw,
            source,
            destination,
        } = cursor;

        let rc = {
            let (_dst, _src) = destination.lock_pair(&source);
            // SAFETY: `raw` is live and consumed here; it is never used again.
            unsafe { ffi::sqlite3_backup_finish(raw.as_ptr()) }
        };
        destination.release_backup_target();
        trace!(rc, "sqlite3_backup_finish returned");

        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(code_error(rc))
        }
    }
}
