//! Recording Controller error types.
//!
//! The taxonomy distinguishes caller-visible lifecycle outcomes (conflict,
//! precondition, timeout) from infrastructure failures so a caller can
//! decide to poll, retry, or give up. Internal details are logged
//! server-side but not exposed to clients.

use common::types::{RecordingId, RoomId};
use thiserror::Error;

/// Recording Controller error type.
///
/// Caller-facing mapping:
/// - `AlreadyStarted`, `AlreadyStopped`: `CONFLICT` (5)
/// - `NoParticipants`: `PRECONDITION_FAILED` (8)
/// - `NotFound`: `NOT_FOUND` (4)
/// - `StartTimeout`, `CannotStopWhileStarting`: `RETRYABLE` (9)
/// - `Engine`, `Lock`, `Store`, `EventBus`, `Config`: `INTERNAL_ERROR` (6)
#[derive(Debug, Error)]
pub enum RecorderError {
    /// Another recording is already in progress for this room (lock held).
    #[error("Recording already started for room {0}")]
    AlreadyStarted(RoomId),

    /// The room has no connected participants; nothing to record.
    #[error("Room {0} has no participants")]
    NoParticipants(RoomId),

    /// No activation was observed within the configured start timeout.
    #[error("Recording start timed out for room {0}")]
    StartTimeout(RoomId),

    /// The engine job is still starting; a stop was issued anyway and the
    /// caller should retry shortly.
    #[error("Recording {0} is still starting and cannot be stopped yet")]
    CannotStopWhileStarting(RecordingId),

    /// The recording already reached a terminal state.
    #[error("Recording {0} is already stopped")]
    AlreadyStopped(RecordingId),

    /// Unknown recording or engine job.
    #[error("Recording not found: {0}")]
    NotFound(RecordingId),

    /// Unexpected media engine failure (opaque).
    #[error("Media engine error: {0}")]
    Engine(String),

    /// Distributed lock service failure.
    #[error("Lock service error: {0}")]
    Lock(String),

    /// Recording store failure.
    #[error("Recording store error: {0}")]
    Store(String),

    /// Event bus failure.
    #[error("Event bus error: {0}")]
    EventBus(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecorderError {
    /// Returns the API-level error code for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RecorderError::NotFound(_) => 4,
            RecorderError::AlreadyStarted(_) | RecorderError::AlreadyStopped(_) => 5,
            RecorderError::Engine(_)
            | RecorderError::Lock(_)
            | RecorderError::Store(_)
            | RecorderError::EventBus(_)
            | RecorderError::Config(_) => 6,
            RecorderError::NoParticipants(_) => 8,
            RecorderError::StartTimeout(_) | RecorderError::CannotStopWhileStarting(_) => 9,
        }
    }

    /// Whether the caller is expected to succeed on a near-term retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RecorderError::StartTimeout(_) | RecorderError::CannotStopWhileStarting(_)
        )
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RecorderError::Engine(_)
            | RecorderError::Lock(_)
            | RecorderError::Store(_)
            | RecorderError::EventBus(_)
            | RecorderError::Config(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}
