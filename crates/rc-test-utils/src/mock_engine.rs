//! Scriptable in-memory media engine.
//!
//! Rooms, participant counts and egress jobs live in a shared map; tests
//! mutate them directly to stage scenarios. `start_egress` behavior is
//! scripted through [`StartBehavior`] so tests can exercise immediate
//! activation, the normal async path, a hung engine, and synchronous
//! failure.

use async_trait::async_trait;
use chrono::Utc;
use common::types::{EgressId, RoomId};
use recording_controller::clients::engine::{
    EgressConfig, EgressInfo, EgressStatus, MediaEngineClient,
};
use recording_controller::errors::RecorderError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How `start_egress` responds.
#[derive(Debug, Clone)]
pub enum StartBehavior {
    /// Create a new job in the given status and return it. Job ids are
    /// deterministic (`EG-1`, `EG-2`, ...) so tests can address them.
    Job(EgressStatus),
    /// Create the job as `Job` would, but only after the delay (an engine
    /// that responds slower than the caller's timeout).
    Delayed(Duration, EgressStatus),
    /// Never return (simulates a hung engine; the future is dropped when
    /// the caller's task is).
    Hang,
    /// Fail synchronously with an engine error.
    Fail(String),
}

#[derive(Default)]
struct EngineState {
    /// Room id -> participant count. Presence in the map means the room exists.
    rooms: HashMap<RoomId, u64>,
    jobs: HashMap<EgressId, EgressInfo>,
    stop_calls: Vec<EgressId>,
    start_calls: u64,
    /// When set, `stop_egress` acknowledges the request but leaves the job
    /// status untouched (a job that refuses to die while starting).
    stop_is_noop: bool,
}

/// In-memory [`MediaEngineClient`] implementation.
#[derive(Clone)]
pub struct MockMediaEngine {
    state: Arc<Mutex<EngineState>>,
    start_behavior: Arc<Mutex<StartBehavior>>,
    next_egress: Arc<AtomicU64>,
}

impl Default for MockMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMediaEngine {
    /// New engine with no rooms and the normal async start behavior
    /// (`StartBehavior::Job(EgressStatus::Starting)`).
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState::default())),
            start_behavior: Arc::new(Mutex::new(StartBehavior::Job(EgressStatus::Starting))),
            next_egress: Arc::new(AtomicU64::new(1)),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap()
    }

    /// Create a room with the given participant count.
    pub fn add_room(&self, room_id: &str, participants: u64) {
        self.state().rooms.insert(RoomId::new(room_id), participants);
    }

    /// Change a room's participant count (room must exist).
    pub fn set_participants(&self, room_id: &str, participants: u64) {
        self.state().rooms.insert(RoomId::new(room_id), participants);
    }

    /// Delete a room. Its jobs are kept; a vanished room with a lingering
    /// job record is a scenario the reapers must handle.
    pub fn remove_room(&self, room_id: &str) {
        self.state().rooms.remove(&RoomId::new(room_id));
    }

    pub fn set_start_behavior(&self, behavior: StartBehavior) {
        *self.start_behavior.lock().unwrap() = behavior;
    }

    /// Stage an existing job.
    pub fn insert_job(&self, info: EgressInfo) {
        self.state().jobs.insert(info.egress_id.clone(), info);
    }

    /// Move a job to a new status (e.g. simulate engine-side completion).
    pub fn set_job_status(&self, egress_id: &str, status: EgressStatus) {
        let mut state = self.state();
        if let Some(job) = state.jobs.get_mut(&EgressId::new(egress_id)) {
            job.status = status;
            job.updated_at = Utc::now();
        }
    }

    /// Remove a job entirely, as if the engine lost it.
    pub fn remove_job(&self, egress_id: &str) {
        self.state().jobs.remove(&EgressId::new(egress_id));
    }

    #[must_use]
    pub fn job_status(&self, egress_id: &str) -> Option<EgressStatus> {
        self.state()
            .jobs
            .get(&EgressId::new(egress_id))
            .map(|job| job.status)
    }

    /// Make `stop_egress` acknowledge without changing job status.
    pub fn set_stop_noop(&self, noop: bool) {
        self.state().stop_is_noop = noop;
    }

    /// Every egress id `stop_egress` was called with, in order.
    #[must_use]
    pub fn stop_calls(&self) -> Vec<EgressId> {
        self.state().stop_calls.clone()
    }

    #[must_use]
    pub fn start_call_count(&self) -> u64 {
        self.state().start_calls
    }

    fn create_job(&self, room_id: &RoomId, status: EgressStatus) -> EgressInfo {
        let seq = self.next_egress.fetch_add(1, Ordering::SeqCst);
        let info = EgressInfo {
            egress_id: EgressId::new(format!("EG-{seq}")),
            room_id: room_id.clone(),
            status,
            updated_at: Utc::now(),
        };
        self.state().jobs.insert(info.egress_id.clone(), info.clone());
        info
    }
}

#[async_trait]
impl MediaEngineClient for MockMediaEngine {
    async fn start_egress(
        &self,
        room_id: &RoomId,
        _config: &EgressConfig,
    ) -> Result<EgressInfo, RecorderError> {
        let behavior = {
            let mut state = self.state();
            state.start_calls += 1;
            self.start_behavior.lock().unwrap().clone()
        };

        match behavior {
            StartBehavior::Job(status) => Ok(self.create_job(room_id, status)),
            StartBehavior::Delayed(delay, status) => {
                tokio::time::sleep(delay).await;
                Ok(self.create_job(room_id, status))
            }
            StartBehavior::Hang => std::future::pending().await,
            StartBehavior::Fail(message) => Err(RecorderError::Engine(message)),
        }
    }

    async fn stop_egress(&self, egress_id: &EgressId) -> Result<Option<EgressInfo>, RecorderError> {
        let mut state = self.state();
        state.stop_calls.push(egress_id.clone());

        let stop_is_noop = state.stop_is_noop;
        let Some(job) = state.jobs.get_mut(egress_id) else {
            return Ok(None);
        };
        if job.status.is_in_progress() && !stop_is_noop {
            job.status = EgressStatus::Ending;
            job.updated_at = Utc::now();
        }
        Ok(Some(job.clone()))
    }

    async fn get_egress(
        &self,
        room_id: &RoomId,
        egress_id: &EgressId,
    ) -> Result<Option<EgressInfo>, RecorderError> {
        Ok(self
            .state()
            .jobs
            .get(egress_id)
            .filter(|job| job.room_id == *room_id)
            .cloned())
    }

    async fn room_exists(&self, room_id: &RoomId) -> Result<bool, RecorderError> {
        Ok(self.state().rooms.contains_key(room_id))
    }

    async fn room_has_participants(&self, room_id: &RoomId) -> Result<bool, RecorderError> {
        Ok(self.state().rooms.get(room_id).copied().unwrap_or(0) > 0)
    }

    async fn list_in_progress_egress(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<EgressInfo>, RecorderError> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|job| job.room_id == *room_id && job.status.is_in_progress())
            .cloned()
            .collect())
    }
}
