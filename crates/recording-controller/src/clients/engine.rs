//! Media engine client.
//!
//! The engine owns rooms, participant presence, and recording jobs
//! ("egress"). This module defines the contract the coordinator and the
//! reapers consume, plus the production HTTP implementation against the
//! engine's REST API.
//!
//! Egress jobs are asynchronous: a successful start request usually returns
//! a job still in `Starting`; the activation confirmation arrives later via
//! the event bus (fed by the webhook-ingestion collaborator).

use crate::errors::RecorderError;
use crate::models::RecordingStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::secret::{ExposeSecret, SecretString};
use common::types::{EgressId, RoomId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Status of an egress job as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EgressStatus {
    Starting,
    Active,
    Ending,
    Complete,
    Aborted,
    Failed,
    LimitReached,
}

impl EgressStatus {
    /// Whether the engine still considers this job live.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, EgressStatus::Starting | EgressStatus::Active)
    }
}

impl From<EgressStatus> for RecordingStatus {
    fn from(status: EgressStatus) -> Self {
        match status {
            EgressStatus::Starting => RecordingStatus::Starting,
            EgressStatus::Active => RecordingStatus::Active,
            EgressStatus::Ending => RecordingStatus::Ending,
            EgressStatus::Complete => RecordingStatus::Complete,
            EgressStatus::Aborted => RecordingStatus::Aborted,
            EgressStatus::Failed => RecordingStatus::Failed,
            EgressStatus::LimitReached => RecordingStatus::LimitReached,
        }
    }
}

/// Snapshot of one egress job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EgressInfo {
    pub egress_id: EgressId,
    pub room_id: RoomId,
    pub status: EgressStatus,
    /// Last time the engine reported progress for this job.
    pub updated_at: DateTime<Utc>,
}

/// Options for a new egress job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EgressConfig {
    /// Record audio only (no video composition).
    #[serde(default)]
    pub audio_only: bool,
    /// Composition layout name understood by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
}

/// Contract against the external media engine.
///
/// `stop_egress` and `get_egress` return `None` when the engine does not
/// know the job; callers decide what that means for the session.
#[async_trait]
pub trait MediaEngineClient: Send + Sync {
    /// Request a new recording job. The returned snapshot may already be
    /// `Active` if the engine started synchronously.
    async fn start_egress(
        &self,
        room_id: &RoomId,
        config: &EgressConfig,
    ) -> Result<EgressInfo, RecorderError>;

    /// Request that a job stop. Idempotent on the engine side; `None` when
    /// the job is unknown.
    async fn stop_egress(&self, egress_id: &EgressId) -> Result<Option<EgressInfo>, RecorderError>;

    /// Current snapshot of one job, or `None` if the engine does not know it.
    async fn get_egress(
        &self,
        room_id: &RoomId,
        egress_id: &EgressId,
    ) -> Result<Option<EgressInfo>, RecorderError>;

    /// Whether the room exists on the engine.
    async fn room_exists(&self, room_id: &RoomId) -> Result<bool, RecorderError>;

    /// Whether the room has at least one connected participant.
    async fn room_has_participants(&self, room_id: &RoomId) -> Result<bool, RecorderError>;

    /// All jobs for the room the engine still considers live.
    async fn list_in_progress_egress(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<EgressInfo>, RecorderError>;
}

/// HTTP client against the engine's REST API.
pub struct HttpMediaEngineClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct StartEgressRequest<'a> {
    room_id: &'a RoomId,
    #[serde(flatten)]
    config: &'a EgressConfig,
}

#[derive(Deserialize)]
struct ParticipantCountResponse {
    count: u64,
}

impl HttpMediaEngineClient {
    /// Create a client for the engine at `base_url`, authenticating with
    /// `api_key` as a bearer token.
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, RecorderError> {
        request
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| {
                warn!(target: "rc.engine", error = %e, "Engine request failed");
                RecorderError::Engine(format!("request failed: {e}"))
            })
    }

    async fn parse_egress(response: reqwest::Response) -> Result<EgressInfo, RecorderError> {
        let status = response.status();
        if !status.is_success() {
            return Err(RecorderError::Engine(format!(
                "engine returned {status}"
            )));
        }
        response.json::<EgressInfo>().await.map_err(|e| {
            warn!(target: "rc.engine", error = %e, "Failed to decode egress response");
            RecorderError::Engine(format!("invalid egress response: {e}"))
        })
    }
}

#[async_trait]
impl MediaEngineClient for HttpMediaEngineClient {
    async fn start_egress(
        &self,
        room_id: &RoomId,
        config: &EgressConfig,
    ) -> Result<EgressInfo, RecorderError> {
        let body = StartEgressRequest { room_id, config };
        let response = self
            .send(self.http.post(self.url("/egress/start")).json(&body))
            .await?;

        let info = Self::parse_egress(response).await?;
        debug!(
            target: "rc.engine",
            room_id = %room_id,
            egress_id = %info.egress_id,
            status = ?info.status,
            "Egress start requested"
        );
        Ok(info)
    }

    async fn stop_egress(&self, egress_id: &EgressId) -> Result<Option<EgressInfo>, RecorderError> {
        let response = self
            .send(self.http.post(self.url(&format!("/egress/{egress_id}/stop"))))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let info = Self::parse_egress(response).await?;
        debug!(
            target: "rc.engine",
            egress_id = %egress_id,
            status = ?info.status,
            "Egress stop requested"
        );
        Ok(Some(info))
    }

    async fn get_egress(
        &self,
        room_id: &RoomId,
        egress_id: &EgressId,
    ) -> Result<Option<EgressInfo>, RecorderError> {
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("/rooms/{room_id}/egress/{egress_id}"))),
            )
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        Ok(Some(Self::parse_egress(response).await?))
    }

    async fn room_exists(&self, room_id: &RoomId) -> Result<bool, RecorderError> {
        let response = self
            .send(self.http.get(self.url(&format!("/rooms/{room_id}"))))
            .await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(RecorderError::Engine(format!("engine returned {s}"))),
        }
    }

    async fn room_has_participants(&self, room_id: &RoomId) -> Result<bool, RecorderError> {
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("/rooms/{room_id}/participants/count"))),
            )
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(RecorderError::Engine(format!(
                "engine returned {}",
                response.status()
            )));
        }

        let counts: ParticipantCountResponse = response.json().await.map_err(|e| {
            RecorderError::Engine(format!("invalid participant count response: {e}"))
        })?;
        Ok(counts.count > 0)
    }

    async fn list_in_progress_egress(
        &self,
        room_id: &RoomId,
    ) -> Result<Vec<EgressInfo>, RecorderError> {
        let response = self
            .send(self.http.get(self.url(&format!("/rooms/{room_id}/egress"))))
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(RecorderError::Engine(format!(
                "engine returned {}",
                response.status()
            )));
        }

        let all: Vec<EgressInfo> = response.json().await.map_err(|e| {
            RecorderError::Engine(format!("invalid egress list response: {e}"))
        })?;

        Ok(all
            .into_iter()
            .filter(|info| info.status.is_in_progress())
            .collect())
    }
}
