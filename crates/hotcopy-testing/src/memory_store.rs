//! # In-Memory Page Store
//!
//! A store is a shared, mutable list of fixed-size pages. Clones refer to
//! the same pages, which is what a backup session needs to retain a store.
//! Writing through any clone bumps a generation counter so a running backup
//! can notice that the source changed underneath it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared in-memory database made of fixed-size pages
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<StoreState>,
}

#[derive(Debug)]
struct StoreState {
    name: String,
    page_size: usize,
    pages: Mutex<Vec<Vec<u8>>>,
    generation: AtomicU64,
    backup_target: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(name: impl Into<String>, page_size: usize) -> Self {
        Self::from_pages(name, page_size, Vec::new())
    }

    /// Create a store with `count` pages of recognizable content
    ///
    /// Every byte of page `n` is `n % 251`, so misplaced pages show up in
    /// comparisons.
    pub fn with_pages(name: impl Into<String>, page_size: usize, count: usize) -> Self {
        let pages = (0..count).map(|n| vec![(n % 251) as u8; page_size]).collect();
        Self::from_pages(name, page_size, pages)
    }

    /// Create a store from explicit page contents
    ///
    /// Pages are resized to `page_size`.
    pub fn from_pages(name: impl Into<String>, page_size: usize, mut pages: Vec<Vec<u8>>) -> Self {
        for page in &mut pages {
            page.resize(page_size, 0);
        }
        Self {
            inner: Arc::new(StoreState {
                name: name.into(),
                page_size,
                pages: Mutex::new(pages),
                generation: AtomicU64::new(0),
                backup_target: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn page_size(&self) -> usize {
        self.inner.page_size
    }

    pub fn page_count(&self) -> usize {
        self.lock_pages().len()
    }

    /// Snapshot of every page
    pub fn pages(&self) -> Vec<Vec<u8>> {
        self.lock_pages().clone()
    }

    /// Overwrite page `index`, growing the store if needed
    pub fn write_page(&self, index: usize, fill: u8) {
        {
            let mut pages = self.lock_pages();
            if pages.len() <= index {
                pages.resize(index + 1, vec![0; self.inner.page_size]);
            }
            pages[index] = vec![fill; self.inner.page_size];
        }
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Number of live handles to this store, including this one
    pub fn retain_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether both handles refer to the same store
    pub fn same_store(&self, other: &MemoryStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_backup_target(&self) -> bool {
        self.inner.backup_target.load(Ordering::Acquire)
    }

    pub(crate) fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Mark this store as the destination of a running backup.
    ///
    /// Returns `false` if it already is one.
    pub(crate) fn claim_backup_target(&self) -> bool {
        self.inner
            .backup_target
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn release_backup_target(&self) {
        self.inner.backup_target.store(false, Ordering::Release);
    }

    /// Copy pages `[start, end)` of the source's current content
    pub(crate) fn read_range(&self, start: usize, end: usize) -> Vec<Vec<u8>> {
        let pages = self.lock_pages();
        let end = end.min(pages.len());
        pages.get(start..end).map(<[_]>::to_vec).unwrap_or_default()
    }

    /// Write `pages` starting at `start` without bumping the generation
    pub(crate) fn store_range(&self, start: usize, pages: Vec<Vec<u8>>) {
        let mut current = self.lock_pages();
        for (offset, page) in pages.into_iter().enumerate() {
            let index = start + offset;
            if current.len() <= index {
                current.resize(index + 1, vec![0; self.inner.page_size]);
            }
            current[index] = page;
        }
    }

    pub(crate) fn truncate(&self, count: usize) {
        self.lock_pages().truncate(count);
    }

    fn lock_pages(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        self.inner.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
