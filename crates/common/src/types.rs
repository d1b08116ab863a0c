//! Shared identifier types for room-recorder components.
//!
//! Rooms and engine jobs are identified by opaque strings handed to us by
//! external systems, so these are string newtypes rather than UUIDs.
//! Recording identifiers are derived (not random) so that a recording can be
//! correlated back to its room and engine job from the id alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a meeting room, owned by the external room entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoomId(pub String);

impl RoomId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier assigned by the media engine to a recording job (egress).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EgressId(pub String);

impl EgressId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EgressId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a recording session.
///
/// Derived deterministically from the room id, the engine job id, and a
/// short uniqueness suffix. Stable for the lifetime of the job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordingId(pub String);

/// Marker used in place of an egress id when a recording never obtained one
/// (the engine call failed or timed out before a job was created).
pub const NO_EGRESS_MARKER: &str = "none";

impl RecordingId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive a recording id from its room and engine job.
    #[must_use]
    pub fn derive(room_id: &RoomId, egress_id: &EgressId) -> Self {
        Self(format!("{room_id}--{egress_id}--{}", short_suffix()))
    }

    /// Derive a recording id for a session that never obtained an engine job.
    #[must_use]
    pub fn derive_unstarted(room_id: &RoomId) -> Self {
        Self(format!("{room_id}--{NO_EGRESS_MARKER}--{}", short_suffix()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn short_suffix() -> String {
    let uuid = Uuid::new_v4().to_string();
    uuid.get(..8).unwrap_or("00000000").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_id_derivation_embeds_room_and_egress() {
        let room = RoomId::new("room-42");
        let egress = EgressId::new("EG_abc123");

        let id = RecordingId::derive(&room, &egress);

        assert!(id.as_str().starts_with("room-42--EG_abc123--"));
        // 8-char uniqueness suffix
        let suffix = id.as_str().rsplit("--").next().unwrap();
        assert_eq!(suffix.len(), 8);
    }

    #[test]
    fn test_recording_ids_are_unique_per_derivation() {
        let room = RoomId::new("room-42");
        let egress = EgressId::new("EG_abc123");

        let a = RecordingId::derive(&room, &egress);
        let b = RecordingId::derive(&room, &egress);

        assert_ne!(a, b, "uniqueness suffix must differ");
    }

    #[test]
    fn test_unstarted_recording_id_uses_marker() {
        let room = RoomId::new("room-7");
        let id = RecordingId::derive_unstarted(&room);
        assert!(id.as_str().starts_with("room-7--none--"));
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let room = RoomId::new("room-1");
        let json = serde_json::to_string(&room).unwrap();
        assert_eq!(json, "\"room-1\"");

        let parsed: RoomId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, room);
    }
}
