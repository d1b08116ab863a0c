//! Integration tests for the two reapers and the scheduler loop.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::types::EgressId;
use rc_test_utils::fixtures::{aged, job, lock_key, session};
use rc_test_utils::TestHarness;
use recording_controller::clients::engine::EgressStatus;
use recording_controller::models::RecordingStatus;
use recording_controller::tasks::{Scheduler, SweepReport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const GRACE: Duration = Duration::from_secs(300);
const STALENESS: Duration = Duration::from_secs(600);

// ============================================================================
// OrphanedLockReaper
// ============================================================================

#[tokio::test]
async fn test_young_lock_is_never_released() {
    let harness = TestHarness::new();
    // Room does not even exist, but the lock is fresh
    harness
        .locks
        .insert_lock_aged(&lock_key("room-1"), Duration::from_secs(10));

    let report = harness.lock_reaper(GRACE).sweep().await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.kept, 1);
    assert!(harness.locks.release_calls().is_empty());
    assert!(harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_old_lock_on_missing_room_released_exactly_once() {
    let harness = TestHarness::new();
    harness
        .locks
        .insert_lock_aged(&lock_key("room-1"), Duration::from_secs(600));

    let report = harness.lock_reaper(GRACE).sweep().await.unwrap();
    assert_eq!(report.reclaimed, 1);
    assert_eq!(harness.locks.release_call_count(&lock_key("room-1")), 1);
    assert!(!harness.locks.is_held(&lock_key("room-1")));

    // Idempotence: a second immediate sweep finds nothing and releases nothing
    let report = harness.lock_reaper(GRACE).sweep().await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(harness.locks.release_call_count(&lock_key("room-1")), 1);
}

#[tokio::test]
async fn test_old_lock_with_live_recording_is_kept() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 2);
    harness
        .engine
        .insert_job(job("room-1", "EG-1", EgressStatus::Active));
    harness
        .locks
        .insert_lock_aged(&lock_key("room-1"), Duration::from_secs(600));

    let report = harness.lock_reaper(GRACE).sweep().await.unwrap();

    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.kept, 1);
    assert!(harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_old_lock_on_empty_room_is_released() {
    let harness = TestHarness::new();
    // Room exists with a live job but nobody in it
    harness.engine.add_room("room-1", 0);
    harness
        .engine
        .insert_job(job("room-1", "EG-1", EgressStatus::Active));
    harness
        .locks
        .insert_lock_aged(&lock_key("room-1"), Duration::from_secs(600));

    let report = harness.lock_reaper(GRACE).sweep().await.unwrap();

    assert_eq!(report.reclaimed, 1);
    assert!(!harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_one_failing_lock_does_not_block_the_sweep() {
    let harness = TestHarness::new();
    harness
        .locks
        .insert_lock_aged(&lock_key("room-bad"), Duration::from_secs(600));
    harness
        .locks
        .insert_lock_aged(&lock_key("room-good"), Duration::from_secs(600));
    harness.locks.fail_operations_on(&lock_key("room-bad"));

    let report = harness.lock_reaper(GRACE).sweep().await.unwrap();

    assert_eq!(report.examined, 2);
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, lock_key("room-bad"));
    assert!(!harness.locks.is_held(&lock_key("room-good")));
}

// ============================================================================
// StaleRecordingReaper
// ============================================================================

#[tokio::test]
async fn test_session_with_vanished_job_is_aborted() {
    let harness = TestHarness::new();
    // Fresh record, but no engine job anywhere
    let record = session("room-1", "EG-1", RecordingStatus::Active);
    let id = record.recording_id.clone();
    harness.store.insert(record);

    let report = harness.session_reaper(STALENESS).sweep().await.unwrap();

    assert_eq!(report.reclaimed, 1);
    let stored = harness.store.get(&id).unwrap();
    assert_eq!(stored.status, RecordingStatus::Aborted);
    assert!(stored.failure_cause.is_some());

    // Idempotence: the aborted record is out of the in-progress set
    let report = harness.session_reaper(STALENESS).sweep().await.unwrap();
    assert_eq!(report.examined, 0);
}

#[tokio::test]
async fn test_fresh_session_with_live_job_is_untouched() {
    let harness = TestHarness::new();
    // Empty room, but the record was updated moments ago
    harness.engine.add_room("room-1", 0);
    harness
        .engine
        .insert_job(job("room-1", "EG-1", EgressStatus::Active));
    let record = session("room-1", "EG-1", RecordingStatus::Active);
    let id = record.recording_id.clone();
    harness.store.insert(record);

    let report = harness.session_reaper(STALENESS).sweep().await.unwrap();

    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.kept, 1);
    assert_eq!(
        harness.store.get(&id).unwrap().status,
        RecordingStatus::Active
    );
    assert!(harness.engine.stop_calls().is_empty());
}

#[tokio::test]
async fn test_stale_session_on_empty_room_is_aborted_and_stopped() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 0);
    harness
        .engine
        .insert_job(job("room-1", "EG-1", EgressStatus::Active));
    harness.locks.insert_lock_aged(&lock_key("room-1"), STALENESS);

    let record = aged(
        session("room-1", "EG-1", RecordingStatus::Active),
        Duration::from_secs(700),
    );
    let id = record.recording_id.clone();
    harness.store.insert(record);

    let report = harness.session_reaper(STALENESS).sweep().await.unwrap();

    assert_eq!(report.reclaimed, 1);
    assert_eq!(
        harness.store.get(&id).unwrap().status,
        RecordingStatus::Aborted
    );
    assert!(harness.engine.stop_calls().contains(&EgressId::new("EG-1")));
    // Stopping the job left no live work, so the lock came back too
    assert!(!harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_stale_session_with_participants_is_untouched() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 4);
    harness
        .engine
        .insert_job(job("room-1", "EG-1", EgressStatus::Active));

    let record = aged(
        session("room-1", "EG-1", RecordingStatus::Active),
        Duration::from_secs(700),
    );
    let id = record.recording_id.clone();
    harness.store.insert(record);

    let report = harness.session_reaper(STALENESS).sweep().await.unwrap();

    // Old timestamp, but the room is populated: presumed legitimate
    assert_eq!(report.reclaimed, 0);
    assert_eq!(report.kept, 1);
    assert_eq!(
        harness.store.get(&id).unwrap().status,
        RecordingStatus::Active
    );
}

#[tokio::test]
async fn test_enumeration_failure_ends_sweep_early() {
    let harness = TestHarness::new();
    harness.store.fail_enumeration();

    assert!(harness.session_reaper(STALENESS).sweep().await.is_err());
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn test_scheduler_runs_sweeps_until_cancelled() {
    let cancel_token = CancellationToken::new();
    let mut scheduler = Scheduler::new(cancel_token.clone());

    let sweeps = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&sweeps);
    scheduler.schedule("test_sweeps", Duration::from_millis(10), move || {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(SweepReport::default())
        }
    });

    tokio::time::sleep(Duration::from_millis(60)).await;
    cancel_token.cancel();
    scheduler.join().await;

    let count = sweeps.load(Ordering::SeqCst);
    assert!(count >= 2, "expected several sweeps, got {count}");

    // No further sweeps after join returned
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(sweeps.load(Ordering::SeqCst), count);
}
