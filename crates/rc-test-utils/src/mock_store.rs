//! In-memory recording store.

use async_trait::async_trait;
use common::types::RecordingId;
use recording_controller::clients::store::RecordingStore;
use recording_controller::errors::RecorderError;
use recording_controller::models::RecordingSession;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct StoreState {
    sessions: HashMap<RecordingId, RecordingSession>,
    fail_writes: bool,
    fail_enumeration: bool,
}

/// In-memory [`RecordingStore`] implementation.
#[derive(Clone, Default)]
pub struct MockRecordingStore {
    state: Arc<Mutex<StoreState>>,
}

impl MockRecordingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap()
    }

    /// Stage a session record directly.
    pub fn insert(&self, session: RecordingSession) {
        self.state()
            .sessions
            .insert(session.recording_id.clone(), session);
    }

    #[must_use]
    pub fn get(&self, recording_id: &RecordingId) -> Option<RecordingSession> {
        self.state().sessions.get(recording_id).cloned()
    }

    #[must_use]
    pub fn all(&self) -> Vec<RecordingSession> {
        self.state().sessions.values().cloned().collect()
    }

    /// Make `create`/`update` fail with `RecorderError::Store`.
    pub fn fail_writes(&self) {
        self.state().fail_writes = true;
    }

    /// Make `find_all_in_progress` fail with `RecorderError::Store`.
    pub fn fail_enumeration(&self) {
        self.state().fail_enumeration = true;
    }
}

#[async_trait]
impl RecordingStore for MockRecordingStore {
    async fn create(&self, session: &RecordingSession) -> Result<(), RecorderError> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(RecorderError::Store("mock write failure".to_string()));
        }
        state
            .sessions
            .insert(session.recording_id.clone(), session.clone());
        Ok(())
    }

    async fn find(
        &self,
        recording_id: &RecordingId,
    ) -> Result<Option<RecordingSession>, RecorderError> {
        Ok(self.state().sessions.get(recording_id).cloned())
    }

    async fn update(&self, session: &RecordingSession) -> Result<(), RecorderError> {
        self.create(session).await
    }

    async fn find_all_in_progress(&self) -> Result<Vec<RecordingSession>, RecorderError> {
        let state = self.state();
        if state.fail_enumeration {
            return Err(RecorderError::Store(
                "mock enumeration failure".to_string(),
            ));
        }
        Ok(state
            .sessions
            .values()
            .filter(|session| session.status.is_in_progress())
            .cloned()
            .collect())
    }
}
