//! Session lifecycle scenarios against the scripted in-memory engine

use hotcopy_core::{
    BackupError, BackupSession, EngineError, EngineErrorCode, SchemaName, SessionState,
    StepOutcome, StepSize,
};
use hotcopy_testing::{EngineCall, MemoryStore, ScriptedEngine};

fn three() -> StepSize {
    StepSize::pages(3).unwrap()
}

fn stores(pages: usize) -> (MemoryStore, MemoryStore) {
    (
        MemoryStore::with_pages("source", 64, pages),
        MemoryStore::new("destination", 64),
    )
}

#[test]
fn test_ten_pages_in_steps_of_three() {
    let (source, destination) = stores(10);
    let engine = ScriptedEngine::new();
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    let mut outcomes = Vec::new();
    let mut remaining = Vec::new();
    loop {
        let outcome = session.step(three()).unwrap();
        outcomes.push(outcome);
        remaining.push(session.remaining().unwrap());
        if outcome.is_done() {
            break;
        }
    }

    assert_eq!(
        outcomes,
        vec![
            StepOutcome::MorePending,
            StepOutcome::MorePending,
            StepOutcome::MorePending,
            StepOutcome::Done
        ]
    );
    assert_eq!(remaining, vec![7, 4, 1, 0]);
    assert_eq!(session.page_count(), Some(10));
    assert_eq!(session.state(), SessionState::Finished);
    assert_eq!(destination.pages(), source.pages());
    assert_eq!(engine.finish_count(), 1);
}

#[test]
fn test_single_large_step_completes() {
    let (source, destination) = stores(10);
    let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();

    let outcome = session.step(StepSize::pages(10).unwrap()).unwrap();
    assert_eq!(outcome, StepOutcome::Done);
    assert_eq!(session.remaining(), Some(0));
    assert_eq!(destination.pages(), source.pages());
}

#[test]
fn test_copy_all_variant_completes_in_one_step() {
    let (source, destination) = stores(37);
    let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();

    assert_eq!(session.step(StepSize::All).unwrap(), StepOutcome::Done);
    assert_eq!(session.steps_taken(), 1);
    assert_eq!(destination.page_count(), 37);
}

#[test]
fn test_empty_source_completes_immediately() {
    let (source, destination) = stores(0);
    let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();

    assert_eq!(session.step(three()).unwrap(), StepOutcome::Done);
    assert_eq!(session.page_count(), Some(0));
    assert_eq!(session.progress().unwrap().percent(), 100.0);
}

#[test]
fn test_step_after_done_is_a_terminal_state_error() {
    let (source, destination) = stores(2);
    let engine = ScriptedEngine::new();
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();
    session.step(StepSize::All).unwrap();

    let err = session.step(three()).unwrap_err();
    assert!(matches!(
        err,
        BackupError::TerminalState {
            state: SessionState::Finished,
            ..
        }
    ));
    assert_eq!(err.to_string(), "Cannot step a backup session in state 'finished'");
    // The engine never saw the rejected call.
    assert_eq!(engine.step_count(), 1);
}

#[test]
fn test_teardown_is_idempotent() {
    let (source, destination) = stores(5);
    let engine = ScriptedEngine::new();
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    session.step(three()).unwrap();
    session.finish().unwrap();
    session.finish().unwrap();
    assert_eq!(session.state(), SessionState::Closed);
    drop(session);

    assert_eq!(engine.finish_count(), 1);
}

#[test]
fn test_teardown_after_done_does_not_release_twice() {
    let (source, destination) = stores(5);
    let engine = ScriptedEngine::new();
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    session.step(StepSize::All).unwrap();
    session.finish().unwrap();
    drop(session);

    assert_eq!(engine.finish_count(), 1);
    assert_eq!(engine.calls().last(), Some(&EngineCall::Finish));
}

#[test]
fn test_locked_source_on_first_step_is_retryable() {
    let (source, destination) = stores(4);
    let engine = ScriptedEngine::new()
        .with_step_failure(0, EngineError::locked("database table is locked"));
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    let err = session.step(three()).unwrap_err();
    assert!(matches!(err, BackupError::Retryable(_)));
    assert!(err.is_retryable());
    assert!(!err.is_terminal());
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(engine.finish_count(), 0);

    assert_eq!(session.step(three()).unwrap(), StepOutcome::MorePending);
    assert_eq!(session.step(three()).unwrap(), StepOutcome::Done);
    assert_eq!(destination.pages(), source.pages());
}

#[test]
fn test_disk_full_mid_backup_is_fatal() {
    let (source, destination) = stores(10);
    let engine = ScriptedEngine::new().with_step_failure(
        1,
        EngineError::new(EngineErrorCode::Full, "database or disk is full"),
    );
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    session.step(three()).unwrap();
    let err = session.step(three()).unwrap_err();
    assert!(matches!(err, BackupError::Fatal(ref e) if e.code == EngineErrorCode::Full));
    assert!(err.to_string().contains("database or disk is full"));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(engine.finish_count(), 1);
    assert!(!destination.is_backup_target());

    let err = session.step(three()).unwrap_err();
    assert!(matches!(
        err,
        BackupError::TerminalState {
            state: SessionState::Failed,
            operation: "step"
        }
    ));
    session.finish().unwrap();
    assert_eq!(engine.finish_count(), 1);
}

#[test]
fn test_counts_are_self_consistent_after_every_step() {
    let (source, destination) = stores(23);
    let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();
    let step = StepSize::pages(4).unwrap();

    let mut copied = 0;
    loop {
        let outcome = session.step(step).unwrap();
        let progress = session.progress().unwrap();
        copied = (copied + 4).min(23);
        assert_eq!(progress.remaining + copied, progress.page_count);
        if outcome.is_done() {
            break;
        }
    }
}

#[test]
fn test_session_holds_store_references_until_terminal() {
    let (source, destination) = stores(6);
    let baseline = (source.retain_count(), destination.retain_count());

    let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();
    assert!(source.retain_count() > baseline.0);
    assert!(destination.retain_count() > baseline.1);

    session.step(three()).unwrap();
    assert!(source.retain_count() > baseline.0);

    session.step(three()).unwrap();
    assert_eq!(session.state(), SessionState::Finished);
    assert_eq!((source.retain_count(), destination.retain_count()), baseline);
}

#[test]
fn test_drop_releases_cursor_and_references() {
    let (source, destination) = stores(6);
    let baseline = source.retain_count();
    let engine = ScriptedEngine::new();
    {
        let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();
        session.step(three()).unwrap();
    }
    assert_eq!(engine.finish_count(), 1);
    assert_eq!(source.retain_count(), baseline);
    assert!(!destination.is_backup_target());
}

#[test]
fn test_setup_failures_take_no_references() {
    let source = MemoryStore::with_pages("source", 64, 3);
    let wrong_size = MemoryStore::new("destination", 128);
    let baseline = (source.retain_count(), wrong_size.retain_count());

    let err = BackupSession::new(ScriptedEngine::new(), &source, &wrong_size).unwrap_err();
    assert!(matches!(err, BackupError::Setup(ref e) if e.message.contains("page size mismatch")));
    assert_eq!((source.retain_count(), wrong_size.retain_count()), baseline);

    let err = BackupSession::new(ScriptedEngine::new(), &source, &source).unwrap_err();
    assert!(matches!(err, BackupError::Setup(_)));
    assert!(err.is_terminal());
}

#[test]
fn test_unknown_schema_is_a_setup_error() {
    let (source, destination) = stores(3);
    let err = BackupSession::with_schemas(
        ScriptedEngine::new(),
        &source,
        &SchemaName::new("archive").unwrap(),
        &destination,
        &SchemaName::main(),
    )
    .unwrap_err();

    assert!(matches!(err, BackupError::Setup(ref e) if e.message == "unknown database archive"));
}

#[test]
fn test_second_session_on_same_destination_is_refused() {
    let (source, destination) = stores(8);
    let other_source = MemoryStore::with_pages("other", 64, 2);

    let mut first = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();
    let err = BackupSession::new(ScriptedEngine::new(), &other_source, &destination).unwrap_err();
    assert!(matches!(err, BackupError::Setup(ref e) if e.code == EngineErrorCode::Busy));

    first.finish().unwrap();
    let mut second = BackupSession::new(ScriptedEngine::new(), &other_source, &destination).unwrap();
    assert_eq!(second.step(StepSize::All).unwrap(), StepOutcome::Done);
}

#[test]
fn test_teardown_error_is_reported_but_session_closes() {
    let (source, destination) = stores(8);
    let engine = ScriptedEngine::new()
        .with_finish_failure(EngineError::new(EngineErrorCode::IoErr, "disk I/O error"));
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();
    session.step(three()).unwrap();

    let err = session.finish().unwrap_err();
    assert!(matches!(err, BackupError::Teardown(_)));
    assert_eq!(session.state(), SessionState::Closed);
    assert!(!destination.is_backup_target());

    session.finish().unwrap();
    drop(session);
    assert_eq!(engine.finish_count(), 1);
}

#[test]
fn test_release_error_after_done_does_not_change_outcome() {
    let (source, destination) = stores(2);
    let engine = ScriptedEngine::new()
        .with_finish_failure(EngineError::new(EngineErrorCode::IoErr, "disk I/O error"));
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    assert_eq!(session.step(StepSize::All).unwrap(), StepOutcome::Done);
    assert_eq!(session.state(), SessionState::Finished);
}

#[test]
fn test_source_write_restarts_copy_and_result_matches() {
    let (source, destination) = stores(9);
    let mut session = BackupSession::new(ScriptedEngine::new(), &source, &destination).unwrap();

    session.step(three()).unwrap();
    session.step(three()).unwrap();
    assert_eq!(session.remaining(), Some(3));

    source.write_page(9, 0x5A);
    session.step(three()).unwrap();
    assert_eq!(session.page_count(), Some(10));
    assert_eq!(session.remaining(), Some(7));

    while !session.step(three()).unwrap().is_done() {}
    assert_eq!(destination.pages(), source.pages());
}

#[test]
fn test_counts_are_queried_only_after_a_successful_step() {
    let (source, destination) = stores(4);
    let engine = ScriptedEngine::new().with_busy_steps(0, 1);
    let mut session = BackupSession::new(engine.clone(), &source, &destination).unwrap();

    let _ = session.step(StepSize::All);
    session.step(StepSize::All).unwrap();

    assert_eq!(
        engine.calls(),
        vec![
            EngineCall::Begin,
            EngineCall::Step(StepSize::All),
            EngineCall::Step(StepSize::All),
            EngineCall::Remaining,
            EngineCall::PageCount,
            EngineCall::Finish,
        ]
    );
}
