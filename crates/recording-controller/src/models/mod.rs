//! Data model for recording sessions.
//!
//! A `RecordingSession` is the persisted view of one engine recording job.
//! The store never enforces the one-recording-per-room invariant; the
//! distributed lock does. Sessions only move forward: once a terminal
//! status is reached they are never resurrected.

use chrono::{DateTime, Utc};
use common::types::{EgressId, RecordingId, RoomId};
use serde::{Deserialize, Serialize};

/// Status of a recording session.
///
/// `Starting` and `Active` are in-progress; all other variants are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingStatus {
    /// Engine job requested; activation not yet confirmed.
    Starting,
    /// Engine confirmed the job is recording.
    Active,
    /// Stop issued; engine has not yet confirmed completion.
    Ending,
    /// Recording finished normally.
    Complete,
    /// Recording was abandoned (reaper or stale-job cleanup).
    Aborted,
    /// Recording failed to start or errored.
    Failed,
    /// Engine stopped the recording at a configured limit (duration/size).
    LimitReached,
}

impl RecordingStatus {
    /// Whether this status counts as in-progress work.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, RecordingStatus::Starting | RecordingStatus::Active)
    }

    /// Whether this status has left the in-progress lifecycle. `Ending`
    /// counts: the stop is confirmed even though completion has not been
    /// reported yet.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_in_progress()
    }
}

/// One recording job on the external media engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    /// Derived, stable identifier (`{room}--{egress}--{suffix}`).
    pub recording_id: RecordingId,
    /// Room this recording belongs to.
    pub room_id: RoomId,
    /// Engine job id. `None` only for synthesized failures where the
    /// engine never produced a job.
    pub egress_id: Option<EgressId>,
    /// Current lifecycle status.
    pub status: RecordingStatus,
    /// Human-readable cause for terminal failure states, if any.
    pub failure_cause: Option<String>,
    /// When the session record was created.
    pub started_at: DateTime<Utc>,
    /// Refreshed whenever the engine reports job progress. Basis for
    /// staleness detection.
    pub last_updated_at: DateTime<Utc>,
}

impl RecordingSession {
    /// Create a new session in `Starting` state for a freshly requested
    /// engine job.
    #[must_use]
    pub fn starting(room_id: RoomId, egress_id: EgressId) -> Self {
        let now = Utc::now();
        Self {
            recording_id: RecordingId::derive(&room_id, &egress_id),
            room_id,
            egress_id: Some(egress_id),
            status: RecordingStatus::Starting,
            failure_cause: None,
            started_at: now,
            last_updated_at: now,
        }
    }

    /// Synthesize a failed session for a start attempt where the engine
    /// never produced a job (synchronous failure or timeout before start).
    #[must_use]
    pub fn failed_unstarted(room_id: RoomId, cause: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            recording_id: RecordingId::derive_unstarted(&room_id),
            room_id,
            egress_id: None,
            status: RecordingStatus::Failed,
            failure_cause: Some(cause.into()),
            started_at: now,
            last_updated_at: now,
        }
    }

    /// Transition to a new status, refreshing `last_updated_at`.
    pub fn transition(&mut self, status: RecordingStatus) {
        self.status = status;
        self.last_updated_at = Utc::now();
    }

    /// Transition to a terminal failure-like status with a cause.
    pub fn fail(&mut self, status: RecordingStatus, cause: impl Into<String>) {
        self.status = status;
        self.failure_cause = Some(cause.into());
        self.last_updated_at = Utc::now();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_statuses() {
        assert!(RecordingStatus::Starting.is_in_progress());
        assert!(RecordingStatus::Active.is_in_progress());
        assert!(!RecordingStatus::Ending.is_in_progress());
        assert!(!RecordingStatus::Complete.is_in_progress());
        assert!(!RecordingStatus::Aborted.is_in_progress());
        assert!(!RecordingStatus::Failed.is_in_progress());
        assert!(!RecordingStatus::LimitReached.is_in_progress());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RecordingStatus::Ending.is_terminal());
        assert!(RecordingStatus::Complete.is_terminal());
        assert!(RecordingStatus::Aborted.is_terminal());
        assert!(RecordingStatus::Failed.is_terminal());
        assert!(RecordingStatus::LimitReached.is_terminal());
        assert!(!RecordingStatus::Starting.is_terminal());
        assert!(!RecordingStatus::Active.is_terminal());
    }

    #[test]
    fn test_starting_session_derives_id_from_room_and_egress() {
        let session = RecordingSession::starting(
            RoomId::new("room-1"),
            EgressId::new("EG_77"),
        );

        assert!(session.recording_id.as_str().starts_with("room-1--EG_77--"));
        assert_eq!(session.status, RecordingStatus::Starting);
        assert_eq!(session.egress_id, Some(EgressId::new("EG_77")));
        assert!(session.failure_cause.is_none());
    }

    #[test]
    fn test_failed_unstarted_session_has_no_egress() {
        let session =
            RecordingSession::failed_unstarted(RoomId::new("room-2"), "engine start timed out");

        assert!(session.egress_id.is_none());
        assert_eq!(session.status, RecordingStatus::Failed);
        assert_eq!(
            session.failure_cause.as_deref(),
            Some("engine start timed out")
        );
    }

    #[test]
    fn test_transition_refreshes_last_updated_at() {
        let mut session =
            RecordingSession::starting(RoomId::new("room-3"), EgressId::new("EG_1"));
        let before = session.last_updated_at;

        std::thread::sleep(std::time::Duration::from_millis(2));
        session.transition(RecordingStatus::Active);

        assert_eq!(session.status, RecordingStatus::Active);
        assert!(session.last_updated_at > before);
    }

    #[test]
    fn test_status_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&RecordingStatus::LimitReached).unwrap();
        assert_eq!(json, "\"LIMIT_REACHED\"");

        let parsed: RecordingStatus = serde_json::from_str("\"ABORTED\"").unwrap();
        assert_eq!(parsed, RecordingStatus::Aborted);
    }

    #[test]
    fn test_session_round_trips_through_json() {
        let session = RecordingSession::starting(
            RoomId::new("room-9"),
            EgressId::new("EG_json"),
        );

        let json = serde_json::to_string(&session).unwrap();
        let parsed: RecordingSession = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.recording_id, session.recording_id);
        assert_eq!(parsed.status, RecordingStatus::Starting);
        assert_eq!(parsed.egress_id, session.egress_id);
    }
}
