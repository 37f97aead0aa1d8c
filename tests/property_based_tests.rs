//! Property-Based Tests for Incremental Copies
//!
//! Any step size must produce the same backup as a single unbounded step,
//! and the page counters observed after each step must match what has
//! actually reached the destination.

use hotcopy::sqlite::{SqliteEngine, SqliteStore, StoreConfig};
use hotcopy::{AsyncBackup, BackupConfig, BackupSession, SessionState, StepOutcome, StepSize};
use hotcopy_testing::{MemoryStore, ScriptedEngine};
use proptest::prelude::*;
use rusqlite::params;

const PAGE_SIZE: usize = 32;

fn step_size_strategy() -> impl Strategy<Value = StepSize> {
    prop_oneof![
        4 => (1u32..40).prop_map(|n| StepSize::pages(n).unwrap()),
        1 => Just(StepSize::All),
    ]
}

fn copy_memory(source: &MemoryStore, step: StepSize) -> (MemoryStore, u64) {
    let destination = MemoryStore::new("destination", PAGE_SIZE);
    let mut session = BackupSession::new(ScriptedEngine::new(), source, &destination).unwrap();
    while !session.step(step).unwrap().is_done() {}
    let steps = session.steps_taken();
    (destination, steps)
}

fn sqlite_source(rows: i64) -> SqliteStore {
    let store = SqliteStore::open_in_memory(&StoreConfig {
        page_size: Some(1024),
        ..StoreConfig::no_wait()
    })
    .unwrap();
    store
        .with_connection(|conn| {
            conn.execute_batch("CREATE TABLE blobs (id INTEGER PRIMARY KEY, data BLOB NOT NULL);")?;
            let mut stmt = conn.prepare("INSERT INTO blobs (id, data) VALUES (?1, ?2)")?;
            for id in 0..rows {
                stmt.execute(params![id, vec![(id % 200) as u8; 500]])?;
            }
            Ok(())
        })
        .unwrap();
    store
}

fn sqlite_rows(store: &SqliteStore) -> Vec<(i64, Vec<u8>)> {
    store
        .with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, data FROM blobs ORDER BY id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>();
            rows
        })
        .unwrap()
}

proptest! {
    /// Property: stepping k pages at a time copies exactly what one step copies
    #[test]
    fn prop_chunked_copy_matches_single_step(
        page_count in 0usize..120,
        step in step_size_strategy()
    ) {
        let source = MemoryStore::with_pages("source", PAGE_SIZE, page_count);

        let (chunked, steps) = copy_memory(&source, step);
        let (single, single_steps) = copy_memory(&source, StepSize::All);

        prop_assert_eq!(chunked.pages(), source.pages());
        prop_assert_eq!(chunked.pages(), single.pages());
        prop_assert_eq!(single_steps, 1);

        let expected_steps = match step.limit() {
            Some(k) => (page_count as u64).div_ceil(u64::from(k)).max(1),
            None => 1,
        };
        prop_assert_eq!(steps, expected_steps);
    }

    /// Property: the async driver takes the same steps as stepping by hand
    #[test]
    fn prop_async_run_matches_blocking_copy(
        page_count in 0usize..80,
        step in step_size_strategy()
    ) {
        let source = MemoryStore::with_pages("source", PAGE_SIZE, page_count);
        let (blocking, blocking_steps) = copy_memory(&source, step);

        let destination = MemoryStore::new("destination", PAGE_SIZE);
        let session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();
        let config = BackupConfig::builder()
            .pages_per_step(step)
            .pause(std::time::Duration::ZERO)
            .build()
            .unwrap();

        let mut backup = AsyncBackup::new(session);
        let report = tokio_test::block_on(async { backup.run(&config, |_| {}).await }).unwrap();

        prop_assert_eq!(report.steps, blocking_steps);
        prop_assert_eq!(report.page_count as usize, page_count);
        prop_assert_eq!(backup.state(), SessionState::Finished);
        prop_assert_eq!(destination.pages(), blocking.pages());
    }

    /// Property: after every step the destination holds exactly the copied
    /// prefix of the source, and remaining counts the pages still missing
    #[test]
    fn prop_counts_match_destination_after_each_step(
        page_count in 1usize..150,
        step in step_size_strategy()
    ) {
        let source = MemoryStore::with_pages("source", PAGE_SIZE, page_count);
        let destination = MemoryStore::new("destination", PAGE_SIZE);
        let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();

        prop_assert_eq!(session.remaining(), None);
        prop_assert_eq!(session.page_count(), None);

        let expected = source.pages();
        let mut previous_remaining = u32::MAX;
        loop {
            let outcome = session.step(step).unwrap();
            let progress = session.progress().unwrap();
            let copied = destination.pages();

            prop_assert_eq!(progress.page_count as usize, page_count);
            prop_assert_eq!(progress.remaining as usize, page_count - copied.len());
            prop_assert_eq!(&copied[..], &expected[..copied.len()]);
            prop_assert!(progress.remaining < previous_remaining);
            prop_assert_eq!(outcome == StepOutcome::Done, progress.remaining == 0);
            previous_remaining = progress.remaining;

            if outcome.is_done() {
                break;
            }
        }
        prop_assert_eq!(session.state(), SessionState::Finished);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: the SQLite engine agrees with itself across step sizes
    #[test]
    fn prop_sqlite_chunked_copy_matches_single_step(
        rows in 1i64..120,
        pages in 1u32..25
    ) {
        let source = sqlite_source(rows);
        let chunked = SqliteStore::open_in_memory(&StoreConfig::no_wait()).unwrap();
        let single = SqliteStore::open_in_memory(&StoreConfig::no_wait()).unwrap();

        let total = source.page_count().unwrap();
        let mut session = BackupSession::new(SqliteEngine, &source, &chunked).unwrap();
        let step = StepSize::pages(pages).unwrap();
        let mut steps = 0u32;
        loop {
            let outcome = session.step(step).unwrap();
            steps += 1;
            let progress = session.progress().unwrap();
            prop_assert_eq!(progress.page_count, total);
            prop_assert_eq!(progress.remaining, total.saturating_sub(pages.saturating_mul(steps)));
            if outcome.is_done() {
                break;
            }
        }
        prop_assert_eq!(steps, total.div_ceil(pages));
        drop(session);

        let mut session = BackupSession::new(SqliteEngine, &source, &single).unwrap();
        prop_assert_eq!(session.step(StepSize::All).unwrap(), StepOutcome::Done);
        drop(session);

        let expected = sqlite_rows(&source);
        prop_assert_eq!(expected.len() as i64, rows);
        prop_assert_eq!(sqlite_rows(&chunked), expected.clone());
        prop_assert_eq!(sqlite_rows(&single), expected);
        prop_assert_eq!(chunked.page_count().unwrap(), single.page_count().unwrap());
    }
}
