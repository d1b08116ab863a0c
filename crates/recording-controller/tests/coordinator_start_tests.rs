//! Integration tests for the start half of the coordinator protocol,
//! driven entirely through the in-memory mocks.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use common::types::EgressId;
use rc_test_utils::fixtures::{active_event, lock_key, room};
use rc_test_utils::{MockEventBus, StartBehavior, TestHarness};
use recording_controller::clients::engine::{EgressConfig, EgressStatus};
use recording_controller::clients::event_bus::{RecordingEvent, RecordingEventKind};
use recording_controller::errors::RecorderError;
use recording_controller::models::RecordingStatus;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Emit the event repeatedly until aborted, standing in for the
/// webhook-ingestion collaborator. Emitting before the coordinator
/// subscribes is harmless; the loop guarantees a delivery after.
fn drive_activation(bus: &MockEventBus, event: RecordingEvent) -> JoinHandle<()> {
    let bus = bus.clone();
    tokio::spawn(async move {
        loop {
            bus.emit(&event);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}

#[tokio::test]
async fn test_start_settles_active_on_activation_event() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 2);

    let driver = drive_activation(&harness.bus, active_event("room-1", Some("EG-1")));
    let session = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap();
    driver.abort();

    assert_eq!(session.status, RecordingStatus::Active);
    assert_eq!(session.egress_id, Some(EgressId::new("EG-1")));

    // Record persisted as active, lock still held until stop or a reaper
    let stored = harness.store.get(&session.recording_id).unwrap();
    assert_eq!(stored.status, RecordingStatus::Active);
    assert!(harness.locks.is_held(&lock_key("room-1")));

    // The best-effort starting signal went out on the bus
    assert!(harness
        .bus
        .published()
        .iter()
        .any(|e| e.kind == RecordingEventKind::Starting));
}

#[tokio::test]
async fn test_activation_event_without_egress_id_matches_any_job() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 1);

    let driver = drive_activation(&harness.bus, active_event("room-1", None));
    let session = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap();
    driver.abort();

    assert_eq!(session.status, RecordingStatus::Active);
}

#[tokio::test]
async fn test_immediately_active_engine_response_needs_no_event() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 3);
    harness
        .engine
        .set_start_behavior(StartBehavior::Job(EgressStatus::Active));

    // No event is ever emitted; the synchronous response settles the call.
    let session = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap();

    assert_eq!(session.status, RecordingStatus::Active);
    assert!(harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_second_start_fails_with_no_side_effects() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 2);

    let driver = drive_activation(&harness.bus, active_event("room-1", None));
    harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap();
    driver.abort();

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::AlreadyStarted(_)));
    // No second job, no second record
    assert_eq!(harness.engine.start_call_count(), 1);
    assert_eq!(harness.store.all().len(), 1);
}

#[tokio::test]
async fn test_start_without_participants_takes_no_lock() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 0);

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::NoParticipants(_)));
    assert!(!harness.locks.is_held(&lock_key("room-1")));
    assert_eq!(harness.engine.start_call_count(), 0);
    assert!(harness.store.all().is_empty());
}

#[tokio::test]
async fn test_timeout_with_hung_engine_releases_lock_and_records_failure() {
    let harness = TestHarness::with_start_timeout(Duration::from_millis(100));
    harness.engine.add_room("room-1", 2);
    harness.engine.set_start_behavior(StartBehavior::Hang);

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::StartTimeout(_)));
    assert!(!harness.locks.is_held(&lock_key("room-1")));

    // A synthesized failure with no job id was persisted
    let sessions = harness.store.all();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, RecordingStatus::Failed);
    assert!(sessions[0].egress_id.is_none());
    assert!(sessions[0].failure_cause.is_some());
}

#[tokio::test]
async fn test_room_is_startable_again_after_timeout() {
    let harness = TestHarness::with_start_timeout(Duration::from_millis(100));
    harness.engine.add_room("room-1", 2);
    harness.engine.set_start_behavior(StartBehavior::Hang);

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::StartTimeout(_)));

    // Engine recovers; the room must be startable without reaper help
    harness
        .engine
        .set_start_behavior(StartBehavior::Job(EgressStatus::Starting));
    let driver = drive_activation(&harness.bus, active_event("room-1", None));
    let session = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap();
    driver.abort();

    assert_eq!(session.status, RecordingStatus::Active);
}

#[tokio::test]
async fn test_timeout_with_starting_job_stops_it_and_releases_lock() {
    let harness = TestHarness::with_start_timeout(Duration::from_millis(100));
    harness.engine.add_room("room-1", 2);
    // Default behavior: job created in Starting, but no activation arrives

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::StartTimeout(_)));

    // Recovery stopped the job; the mock acknowledges stops as Ending, so
    // the lock was safe to release
    assert!(harness
        .engine
        .stop_calls()
        .contains(&EgressId::new("EG-1")));
    assert!(!harness.locks.is_held(&lock_key("room-1")));

    let sessions = harness.store.all();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, RecordingStatus::Failed);
    assert_eq!(sessions[0].egress_id, Some(EgressId::new("EG-1")));
}

#[tokio::test]
async fn test_timeout_with_unstoppable_starting_job_leaves_lock_for_reaper() {
    let harness = TestHarness::with_start_timeout(Duration::from_millis(100));
    harness.engine.add_room("room-1", 2);
    // Stop requests are acknowledged but the job stays in Starting; a late
    // activation could still arrive, so the lock must survive for the
    // orphaned-lock reaper to judge later.
    harness.engine.set_stop_noop(true);

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::StartTimeout(_)));
    assert!(harness.locks.is_held(&lock_key("room-1")));
    assert_eq!(harness.locks.release_calls().len(), 0);
}

#[tokio::test]
async fn test_engine_response_after_timeout_leaves_single_record() {
    let harness = TestHarness::with_start_timeout(Duration::from_millis(100));
    harness.engine.add_room("room-1", 2);
    // Engine answers well after the timeout has settled the call
    harness.engine.set_start_behavior(StartBehavior::Delayed(
        Duration::from_millis(200),
        EgressStatus::Starting,
    ));

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RecorderError::StartTimeout(_)));

    // Let the late engine response land in the abandoned work branch
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Only the synthesized failure exists; no second Starting record
    let sessions = harness.store.all();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].status, RecordingStatus::Failed);
    assert!(sessions[0].egress_id.is_none());

    // The late job was told to stop, and the lock stayed released
    assert!(harness.engine.stop_calls().contains(&EgressId::new("EG-1")));
    assert!(!harness.locks.is_held(&lock_key("room-1")));
}

#[tokio::test]
async fn test_synchronous_engine_failure_releases_lock() {
    let harness = TestHarness::new();
    harness.engine.add_room("room-1", 2);
    harness
        .engine
        .set_start_behavior(StartBehavior::Fail("egress quota exceeded".to_string()));

    let err = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RecorderError::Engine(_)));
    // No live job behind the failure, so the lock came straight back
    assert!(!harness.locks.is_held(&lock_key("room-1")));

    // And the room is immediately startable
    harness
        .engine
        .set_start_behavior(StartBehavior::Job(EgressStatus::Starting));
    let driver = drive_activation(&harness.bus, active_event("room-1", None));
    let session = harness
        .coordinator
        .start(&room("room-1"), EgressConfig::default())
        .await
        .unwrap();
    driver.abort();
    assert_eq!(session.status, RecordingStatus::Active);
}
