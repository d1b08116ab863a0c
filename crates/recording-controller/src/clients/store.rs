//! Recording store backed by Redis.
//!
//! Persists [`RecordingSession`] records as JSON blobs plus an index set of
//! in-progress session ids so the stale-recording reaper can enumerate its
//! work without scanning every session ever written.
//!
//! # Key Patterns
//!
//! - `recording:session:{recording_id}` - session record (JSON)
//! - `recording:inprogress` - SET of recording ids in `Starting`/`Active`
//!
//! The store does NOT enforce the one-recording-per-room invariant; the
//! distributed lock does.

use crate::errors::RecorderError;
use crate::models::RecordingSession;
use async_trait::async_trait;
use common::types::RecordingId;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::{debug, error, warn};

/// Key under which a session record is stored.
#[must_use]
pub fn session_key(recording_id: &RecordingId) -> String {
    format!("recording:session:{recording_id}")
}

/// Index set of in-progress recording ids.
pub const IN_PROGRESS_INDEX_KEY: &str = "recording:inprogress";

/// Persisted recording records.
#[async_trait]
pub trait RecordingStore: Send + Sync {
    /// Persist a new session record.
    async fn create(&self, session: &RecordingSession) -> Result<(), RecorderError>;

    /// Fetch a session by id.
    async fn find(&self, recording_id: &RecordingId)
        -> Result<Option<RecordingSession>, RecorderError>;

    /// Persist an updated session record, maintaining the in-progress index.
    async fn update(&self, session: &RecordingSession) -> Result<(), RecorderError>;

    /// All sessions currently in an in-progress status.
    async fn find_all_in_progress(&self) -> Result<Vec<RecordingSession>, RecorderError>;
}

/// Redis-backed recording store.
///
/// Cheaply cloneable via the underlying `MultiplexedConnection`.
#[derive(Clone)]
pub struct RedisRecordingStore {
    /// Redis client (kept for potential reconnection scenarios).
    #[allow(dead_code)]
    client: Client,
    connection: MultiplexedConnection,
}

impl RedisRecordingStore {
    /// Create a new Redis-backed recording store.
    ///
    /// # Errors
    ///
    /// Returns `RecorderError::Store` if the connection fails.
    pub async fn new(redis_url: &str) -> Result<Self, RecorderError> {
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "rc.store", error = %e, "Failed to open Redis client");
            RecorderError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "rc.store", error = %e, "Failed to connect to Redis");
                RecorderError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { client, connection })
    }

    async fn write(&self, session: &RecordingSession) -> Result<(), RecorderError> {
        let json = serde_json::to_string(session).map_err(|e| {
            error!(target: "rc.store", error = %e, "Failed to serialize session");
            RecorderError::Store(format!("Failed to serialize session: {e}"))
        })?;

        let mut conn = self.connection.clone();
        let key = session_key(&session.recording_id);

        let _: () = conn.set(&key, json).await.map_err(|e| {
            warn!(
                target: "rc.store",
                error = %e,
                recording_id = %session.recording_id,
                "Failed to write session"
            );
            RecorderError::Store(format!("Failed to write session: {e}"))
        })?;

        // Keep the in-progress index in step with the record.
        let id = session.recording_id.as_str();
        let indexed: Result<(), redis::RedisError> = if session.status.is_in_progress() {
            conn.sadd(IN_PROGRESS_INDEX_KEY, id).await
        } else {
            conn.srem(IN_PROGRESS_INDEX_KEY, id).await
        };
        indexed.map_err(|e| {
            warn!(
                target: "rc.store",
                error = %e,
                recording_id = %session.recording_id,
                "Failed to update in-progress index"
            );
            RecorderError::Store(format!("Failed to update in-progress index: {e}"))
        })?;

        debug!(
            target: "rc.store",
            recording_id = %session.recording_id,
            status = ?session.status,
            "Session persisted"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordingStore for RedisRecordingStore {
    async fn create(&self, session: &RecordingSession) -> Result<(), RecorderError> {
        self.write(session).await
    }

    async fn find(
        &self,
        recording_id: &RecordingId,
    ) -> Result<Option<RecordingSession>, RecorderError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(session_key(recording_id)).await.map_err(|e| {
            warn!(
                target: "rc.store",
                error = %e,
                recording_id = %recording_id,
                "Failed to read session"
            );
            RecorderError::Store(format!("Failed to read session: {e}"))
        })?;

        match raw {
            Some(json) => {
                let session: RecordingSession = serde_json::from_str(&json).map_err(|e| {
                    error!(
                        target: "rc.store",
                        error = %e,
                        recording_id = %recording_id,
                        "Failed to deserialize session"
                    );
                    RecorderError::Store(format!("Failed to deserialize session: {e}"))
                })?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, session: &RecordingSession) -> Result<(), RecorderError> {
        self.write(session).await
    }

    async fn find_all_in_progress(&self) -> Result<Vec<RecordingSession>, RecorderError> {
        let mut conn = self.connection.clone();

        let ids: Vec<String> = conn.smembers(IN_PROGRESS_INDEX_KEY).await.map_err(|e| {
            warn!(target: "rc.store", error = %e, "Failed to read in-progress index");
            RecorderError::Store(format!("Failed to read in-progress index: {e}"))
        })?;

        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            let recording_id = RecordingId::new(id);
            match self.find(&recording_id).await? {
                Some(session) if session.status.is_in_progress() => sessions.push(session),
                Some(_) => {
                    // Index lagged behind a terminal transition; heal it.
                    let _: () = conn
                        .srem(IN_PROGRESS_INDEX_KEY, recording_id.as_str())
                        .await
                        .unwrap_or(());
                }
                None => {
                    debug!(
                        target: "rc.store",
                        recording_id = %recording_id,
                        "Dropping dangling in-progress index entry"
                    );
                    let _: () = conn
                        .srem(IN_PROGRESS_INDEX_KEY, recording_id.as_str())
                        .await
                        .unwrap_or(());
                }
            }
        }

        Ok(sessions)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::types::{EgressId, RoomId};

    #[test]
    fn test_session_key_format() {
        let id = RecordingId::new("room-1--EG_1--abcd1234");
        assert_eq!(
            session_key(&id),
            "recording:session:room-1--EG_1--abcd1234"
        );
    }

    #[test]
    fn test_session_json_is_stable_for_storage() {
        let session =
            RecordingSession::starting(RoomId::new("room-1"), EgressId::new("EG_1"));

        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"STARTING\""));
        assert!(json.contains("\"room_id\":\"room-1\""));

        let parsed: RecordingSession = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.recording_id, session.recording_id);
    }
}
