//! Pre-wired test harness and test data builders.

use crate::{MockEventBus, MockLockService, MockMediaEngine, MockRecordingStore};
use chrono::{Duration as ChronoDuration, Utc};
use common::types::{EgressId, RoomId};
use recording_controller::clients::engine::{EgressInfo, EgressStatus};
use recording_controller::clients::event_bus::{RecordingEvent, RecordingEventKind};
use recording_controller::clients::lock::active_recording_lock_key;
use recording_controller::coordinator::{CoordinatorConfig, RecordingCoordinator};
use recording_controller::models::{RecordingSession, RecordingStatus};
use recording_controller::tasks::orphaned_lock_reaper::OrphanedLockReaper;
use recording_controller::tasks::stale_recording_reaper::StaleRecordingReaper;
use std::sync::Arc;
use std::time::Duration;

/// Default activation timeout for harness coordinators. Short enough that
/// timeout-path tests stay fast, long enough that event-path tests never
/// time out spuriously.
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_millis(200);

/// Batch size used by harness-built reapers.
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// A coordinator wired to one set of in-memory collaborators.
///
/// The mock handles are cheap clones of what the coordinator holds, so
/// state staged or inspected through them is what the coordinator sees.
pub struct TestHarness {
    pub coordinator: RecordingCoordinator,
    pub engine: MockMediaEngine,
    pub locks: MockLockService,
    pub bus: MockEventBus,
    pub store: MockRecordingStore,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    #[must_use]
    pub fn new() -> Self {
        Self::with_start_timeout(DEFAULT_START_TIMEOUT)
    }

    #[must_use]
    pub fn with_start_timeout(start_timeout: Duration) -> Self {
        let engine = MockMediaEngine::new();
        let locks = MockLockService::new();
        let bus = MockEventBus::new();
        let store = MockRecordingStore::new();

        let coordinator = RecordingCoordinator::new(
            Arc::new(engine.clone()),
            Arc::new(locks.clone()),
            Arc::new(bus.clone()),
            Arc::new(store.clone()),
            CoordinatorConfig {
                lock_ttl: Duration::from_secs(120),
                start_timeout,
            },
        );

        Self {
            coordinator,
            engine,
            locks,
            bus,
            store,
        }
    }

    /// An orphaned-lock reaper over this harness's collaborators.
    #[must_use]
    pub fn lock_reaper(&self, grace_period: Duration) -> OrphanedLockReaper {
        OrphanedLockReaper::new(
            Arc::new(self.locks.clone()),
            Arc::new(self.engine.clone()),
            grace_period,
            DEFAULT_BATCH_SIZE,
        )
    }

    /// A stale-recording reaper over this harness's collaborators.
    #[must_use]
    pub fn session_reaper(&self, staleness_threshold: Duration) -> StaleRecordingReaper {
        StaleRecordingReaper::new(
            Arc::new(self.store.clone()),
            Arc::new(self.engine.clone()),
            Arc::new(self.locks.clone()),
            staleness_threshold,
            DEFAULT_BATCH_SIZE,
        )
    }
}

#[must_use]
pub fn room(id: &str) -> RoomId {
    RoomId::new(id)
}

#[must_use]
pub fn egress(id: &str) -> EgressId {
    EgressId::new(id)
}

/// Lock key for a room, matching the production key scheme.
#[must_use]
pub fn lock_key(room_id: &str) -> String {
    active_recording_lock_key(&room(room_id))
}

/// An activation event, as the webhook-ingestion collaborator would emit.
#[must_use]
pub fn active_event(room_id: &str, egress_id: Option<&str>) -> RecordingEvent {
    RecordingEvent {
        room_id: room(room_id),
        egress_id: egress_id.map(EgressId::new),
        kind: RecordingEventKind::Active,
    }
}

/// An engine job snapshot.
#[must_use]
pub fn job(room_id: &str, egress_id: &str, status: EgressStatus) -> EgressInfo {
    EgressInfo {
        egress_id: egress(egress_id),
        room_id: room(room_id),
        status,
        updated_at: Utc::now(),
    }
}

/// A session in the given in-progress status.
#[must_use]
pub fn session(room_id: &str, egress_id: &str, status: RecordingStatus) -> RecordingSession {
    let mut session = RecordingSession::starting(room(room_id), egress(egress_id));
    if status != RecordingStatus::Starting {
        session.transition(status);
    }
    session
}

/// Push a session's `last_updated_at` into the past.
#[must_use]
pub fn aged(mut session: RecordingSession, age: Duration) -> RecordingSession {
    session.last_updated_at =
        Utc::now() - ChronoDuration::from_std(age).expect("age out of chrono range");
    session
}
