//! Shared SQLite store handles
//!
//! A [`SqliteStore`] wraps one open connection behind a mutex and an `Arc`.
//! Clones are retaining references to the same connection, so a backup
//! session keeps the database open for as long as it runs no matter what
//! the rest of the program does with its own handle.
//!
//! Connections are opened without SQLite's own mutex. While a store is the
//! destination of a backup, the backup owns its pages: [`SqliteStore::with_connection`]
//! and everything built on it return [`StoreError::BackupInProgress`] until
//! the session finishes. The source stays fully usable.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Configuration for store connections
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Switch the database to WAL journaling on open
    pub wal_mode: bool,
    pub cache_size_kb: i32,
    /// How long SQLite itself waits on a lock before reporting busy
    pub busy_timeout: Duration,
    /// Page size for a database that has no content yet
    pub page_size: Option<u32>,
    /// Open without write access; pragmas that write are skipped
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            wal_mode: false,
            cache_size_kb: 64 * 1024, // 64MB
            busy_timeout: Duration::from_millis(5000),
            page_size: None,
            read_only: false,
        }
    }
}

impl StoreConfig {
    /// Busy/locked results are reported immediately instead of after a wait
    pub fn no_wait() -> Self {
        Self {
            busy_timeout: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// A shared, retaining handle to one open SQLite connection
#[derive(Debug, Clone)]
pub struct SqliteStore {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    label: String,
    connection: Mutex<Connection>,
    backup_target: AtomicBool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: impl AsRef<Path>, config: &StoreConfig) -> StoreResult<Self> {
        let path = validate_database_path(path.as_ref())?;

        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if config.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(&path, flags).map_err(|source| StoreError::Open {
            path: path.clone(),
            source,
        })?;
        configure_connection(&conn, config)?;

        debug!(path = %path.display(), read_only = config.read_only, "Opened SQLite store");
        Ok(Self::from_connection(conn, path.display().to_string()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|source| StoreError::Open {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        configure_connection(&conn, &StoreConfig {
            wal_mode: false,
            read_only: false,
            ..config.clone()
        })?;
        Ok(Self::from_connection(conn, ":memory:"))
    }

    /// Wrap an already configured connection
    pub fn from_connection(conn: Connection, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                label: label.into(),
                connection: Mutex::new(conn),
                backup_target: AtomicBool::new(false),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Run `f` with exclusive use of the connection.
    ///
    /// Refused with [`StoreError::BackupInProgress`] while this store is the
    /// destination of an unfinished backup.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> StoreResult<T> {
        let conn = self.lock();
        // Checked under the lock, so no backup can initialise while `f` runs.
        if self.is_backup_target() {
            return Err(StoreError::BackupInProgress {
                label: self.inner.label.clone(),
            });
        }
        f(&conn).map_err(StoreError::Query)
    }

    pub fn execute_batch(&self, sql: &str) -> StoreResult<()> {
        self.with_connection(|conn| conn.execute_batch(sql))
    }

    /// Page size of the `main` database in bytes
    pub fn page_size(&self) -> StoreResult<u32> {
        self.pragma_u32("page_size")
    }

    /// Number of pages in the `main` database
    pub fn page_count(&self) -> StoreResult<u32> {
        self.pragma_u32("page_count")
    }

    /// Number of live handles to this store, including this one
    pub fn retain_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether both handles share one connection
    pub fn same_store(&self, other: &SqliteStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_backup_target(&self) -> bool {
        self.inner.backup_target.load(Ordering::Acquire)
    }

    pub(crate) fn claim_backup_target(&self) -> bool {
        self.inner
            .backup_target
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_backup_target(&self) {
        self.inner.backup_target.store(false, Ordering::Release);
    }

    /// Lock the connection, ignoring poisoning
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock this store and `other` in a stable global order.
    ///
    /// Returns the guards as `(self, other)`. The two stores must differ.
    pub(crate) fn lock_pair<'a>(
        &'a self,
        other: &'a SqliteStore,
    ) -> (MutexGuard<'a, Connection>, MutexGuard<'a, Connection>) {
        let mine = Arc::as_ptr(&self.inner) as usize;
        let theirs = Arc::as_ptr(&other.inner) as usize;
        if mine < theirs {
            let first = self.lock();
            let second = other.lock();
            (first, second)
        } else {
            let second = other.lock();
            let first = self.lock();
            (first, second)
        }
    }

    fn pragma_u32(&self, pragma: &'static str) -> StoreResult<u32> {
        let value: i64 = self.with_connection(|conn| {
            conn.query_row(&format!("PRAGMA {pragma}"), [], |row| row.get(0))
        })?;
        u32::try_from(value).map_err(|_| StoreError::OutOfRange { pragma, value })
    }
}

fn validate_database_path(path: &Path) -> StoreResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::InvalidPath {
            path: path.to_path_buf(),
            reason: "path is empty".to_string(),
        });
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        return Err(StoreError::InvalidPath {
            path: path.to_path_buf(),
            reason: format!("directory '{}' does not exist", parent.display()),
        });
    }

    if path.is_dir() {
        return Err(StoreError::InvalidPath {
            path: path.to_path_buf(),
            reason: "path is a directory".to_string(),
        });
    }

    Ok(path.to_path_buf())
}

fn configure_connection(conn: &Connection, config: &StoreConfig) -> StoreResult<()> {
    if let Some(size) = config.page_size
        && !config.read_only
    {
        // Only takes effect before the first table is created.
        conn.pragma_update(None, "page_size", size)
            .map_err(StoreError::Configure)?;
    }
    conn.pragma_update(None, "cache_size", -config.cache_size_kb)
        .map_err(StoreError::Configure)?;
    conn.busy_timeout(config.busy_timeout)
        .map_err(StoreError::Configure)?;

    if config.wal_mode && !config.read_only {
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(StoreError::Configure)?;
        debug!(journal_mode = %mode, "Configured journal mode");
    }

    Ok(())
}
