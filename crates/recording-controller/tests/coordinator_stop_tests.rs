//! Integration tests for the stop half of the coordinator protocol.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::types::{EgressId, RecordingId};
use rc_test_utils::fixtures::{job, lock_key, session};
use rc_test_utils::TestHarness;
use recording_controller::clients::engine::EgressStatus;
use recording_controller::errors::RecorderError;
use recording_controller::models::RecordingStatus;
use std::time::Duration;

/// Stage a held lock plus matching store record and engine job.
fn stage_recording(harness: &TestHarness, room: &str, egress: &str, status: EgressStatus) -> RecordingId {
    harness.engine.add_room(room, 2);
    harness.engine.insert_job(job(room, egress, status));
    harness.locks.insert_lock_aged(&lock_key(room), Duration::ZERO);

    let record = session(room, egress, RecordingStatus::from(status));
    let id = record.recording_id.clone();
    harness.store.insert(record);
    id
}

#[tokio::test]
async fn test_stop_active_recording() {
    let harness = TestHarness::new();
    let id = stage_recording(&harness, "room-1", "EG-9", EgressStatus::Active);

    let stopped = harness.coordinator.stop(&id).await.unwrap();

    assert_eq!(stopped.status, RecordingStatus::Ending);
    assert!(harness.engine.stop_calls().contains(&EgressId::new("EG-9")));

    // Record persisted and lock released
    let stored = harness.store.get(&id).unwrap();
    assert_eq!(stored.status, RecordingStatus::Ending);
    assert!(!harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_stop_unknown_recording() {
    let harness = TestHarness::new();

    let err = harness
        .coordinator
        .stop(&RecordingId::new("room-1--EG-1--deadbeef"))
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::NotFound(_)));
}

#[tokio::test]
async fn test_stop_terminal_recording_is_already_stopped() {
    let harness = TestHarness::new();
    let record = session("room-1", "EG-1", RecordingStatus::Complete);
    let id = record.recording_id.clone();
    harness.store.insert(record);

    let err = harness.coordinator.stop(&id).await.unwrap_err();

    assert!(matches!(err, RecorderError::AlreadyStopped(_)));

    // Ending counts as already stopped too: the stop is confirmed even
    // though completion has not been reported yet
    let ending = session("room-2", "EG-2", RecordingStatus::Ending);
    let ending_id = ending.recording_id.clone();
    harness.store.insert(ending);

    let err = harness.coordinator.stop(&ending_id).await.unwrap_err();
    assert!(matches!(err, RecorderError::AlreadyStopped(_)));

    // Terminal records never reach the engine
    assert!(harness.engine.stop_calls().is_empty());
}

#[tokio::test]
async fn test_stop_while_starting_issues_engine_stop_but_fails() {
    let harness = TestHarness::new();
    let id = stage_recording(&harness, "room-1", "EG-2", EgressStatus::Starting);

    let err = harness.coordinator.stop(&id).await.unwrap_err();

    assert!(matches!(err, RecorderError::CannotStopWhileStarting(_)));
    // The stop was still issued so a dangling starting job cannot linger
    assert!(harness.engine.stop_calls().contains(&EgressId::new("EG-2")));
    // The record is untouched; the caller retries once the state settles
    let stored = harness.store.get(&id).unwrap();
    assert_eq!(stored.status, RecordingStatus::Starting);
    assert!(harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_stop_with_vanished_engine_job_is_not_found() {
    let harness = TestHarness::new();
    let record = session("room-1", "EG-3", RecordingStatus::Active);
    let id = record.recording_id.clone();
    harness.store.insert(record);
    // No engine job staged

    let err = harness.coordinator.stop(&id).await.unwrap_err();

    assert!(matches!(err, RecorderError::NotFound(_)));
}

#[tokio::test]
async fn test_stop_syncs_record_when_engine_finished_first() {
    let harness = TestHarness::new();
    let id = stage_recording(&harness, "room-1", "EG-4", EgressStatus::Active);
    // Engine finished the job behind our back
    harness.engine.set_job_status("EG-4", EgressStatus::Complete);

    let err = harness.coordinator.stop(&id).await.unwrap_err();

    assert!(matches!(err, RecorderError::AlreadyStopped(_)));
    // The record was synced to the engine's terminal state
    let stored = harness.store.get(&id).unwrap();
    assert_eq!(stored.status, RecordingStatus::Complete);
}
