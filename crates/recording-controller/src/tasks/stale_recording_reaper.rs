//! Stale-recording reaper.
//!
//! Session records move through their lifecycle on the back of engine
//! webhooks. When the webhook flow breaks (engine crash, dropped delivery,
//! controller restart mid-recording) an in-progress record stops receiving
//! updates and would sit in `Starting`/`Active` forever. This sweep walks
//! every in-progress record and reconciles it:
//!
//! 1. no matching in-progress engine job: abort the record immediately,
//!    the job vanished without notice;
//! 2. record updated within the staleness threshold: leave it alone;
//! 3. stale and the room is gone or empty: abort the record and ask the
//!    engine to stop the job (tolerating a job that is already gone);
//! 4. stale but the room still has participants: presumed legitimately
//!    running, leave it alone.
//!
//! Aborting a record also releases the room's lock, unless a fresh engine
//! query shows another live job holding the room.

use crate::clients::engine::MediaEngineClient;
use crate::clients::lock::{active_recording_lock_key, LockService};
use crate::clients::store::RecordingStore;
use crate::errors::RecorderError;
use crate::models::{RecordingSession, RecordingStatus};
use crate::tasks::SweepReport;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a single session examination decided.
enum SessionVerdict {
    /// Record aborted.
    Settled,
    /// Record deliberately left alone.
    Kept,
}

/// Settles in-progress session records the webhook flow abandoned.
pub struct StaleRecordingReaper {
    store: Arc<dyn RecordingStore>,
    engine: Arc<dyn MediaEngineClient>,
    locks: Arc<dyn LockService>,
    /// Minimum time since the last record update before a populated room's
    /// recording is considered possibly abandoned.
    staleness_threshold: Duration,
    /// Sessions examined concurrently per batch.
    batch_size: usize,
}

impl StaleRecordingReaper {
    #[must_use]
    pub fn new(
        store: Arc<dyn RecordingStore>,
        engine: Arc<dyn MediaEngineClient>,
        locks: Arc<dyn LockService>,
        staleness_threshold: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            engine,
            locks,
            staleness_threshold,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one sweep over every in-progress session record.
    ///
    /// Per-item failures are collected in the report; only enumeration
    /// failure aborts the sweep.
    ///
    /// # Errors
    ///
    /// Returns `RecorderError::Store` if the session enumeration fails.
    pub async fn sweep(&self) -> Result<SweepReport, RecorderError> {
        let sessions = self.store.find_all_in_progress().await?;

        let mut report = SweepReport {
            examined: sessions.len(),
            ..SweepReport::default()
        };

        for chunk in sessions.chunks(self.batch_size) {
            let mut batch: JoinSet<(String, Result<SessionVerdict, RecorderError>)> =
                JoinSet::new();
            for session in chunk {
                let store = Arc::clone(&self.store);
                let engine = Arc::clone(&self.engine);
                let locks = Arc::clone(&self.locks);
                let threshold = self.staleness_threshold;
                let session = session.clone();
                batch.spawn(async move {
                    let id = session.recording_id.to_string();
                    let verdict =
                        examine_session(&store, &engine, &locks, session, threshold).await;
                    (id, verdict)
                });
            }

            while let Some(joined) = batch.join_next().await {
                match joined {
                    Ok((_, Ok(SessionVerdict::Settled))) => report.reclaimed += 1,
                    Ok((_, Ok(SessionVerdict::Kept))) => report.kept += 1,
                    Ok((id, Err(e))) => report.failures.push((id, e)),
                    Err(e) => report.failures.push((
                        "<batch task>".to_string(),
                        RecorderError::Store(format!("examination task failed: {e}")),
                    )),
                }
            }
        }

        Ok(report)
    }
}

/// Reconcile one in-progress session record against the engine.
async fn examine_session(
    store: &Arc<dyn RecordingStore>,
    engine: &Arc<dyn MediaEngineClient>,
    locks: &Arc<dyn LockService>,
    mut session: RecordingSession,
    staleness_threshold: Duration,
) -> Result<SessionVerdict, RecorderError> {
    // Re-read before acting: another instance (or a late webhook) may have
    // settled this record since enumeration.
    match store.find(&session.recording_id).await? {
        Some(current) if current.status.is_in_progress() => session = current,
        Some(_) | None => {
            debug!(
                target: "rc.reaper",
                recording_id = %session.recording_id,
                "Record settled since enumeration, skipping"
            );
            return Ok(SessionVerdict::Kept);
        }
    }

    // 1. Job vanished without notice: abort regardless of staleness.
    let live_job = match &session.egress_id {
        Some(egress_id) => engine
            .get_egress(&session.room_id, egress_id)
            .await?
            .is_some_and(|job| job.status.is_in_progress()),
        None => false,
    };
    if !live_job {
        abort_session(store, locks, engine, &mut session, "engine job no longer in progress")
            .await?;
        return Ok(SessionVerdict::Settled);
    }

    // 2. Fresh record: the webhook flow is keeping up, leave it alone.
    let threshold = chrono::Duration::from_std(staleness_threshold)
        .unwrap_or(chrono::Duration::MAX);
    if Utc::now() - session.last_updated_at < threshold {
        return Ok(SessionVerdict::Kept);
    }

    // 3./4. Stale record with a live job: the room decides.
    let room_populated = engine.room_exists(&session.room_id).await?
        && engine.room_has_participants(&session.room_id).await?;
    if room_populated {
        debug!(
            target: "rc.reaper",
            recording_id = %session.recording_id,
            "Stale record but room still has participants, keeping"
        );
        return Ok(SessionVerdict::Kept);
    }

    if let Some(egress_id) = session.egress_id.clone() {
        // Idempotent on the engine side; a job that finished in the
        // meantime comes back as None and that is fine.
        if let Err(e) = engine.stop_egress(&egress_id).await {
            warn!(
                target: "rc.reaper",
                recording_id = %session.recording_id,
                egress_id = %egress_id,
                error = %e,
                "Stop request for abandoned job failed"
            );
        }
    }
    abort_session(store, locks, engine, &mut session, "room gone or empty past staleness threshold")
        .await?;
    Ok(SessionVerdict::Settled)
}

/// Mark the session `Aborted`, persist it, and release the room's lock if
/// no other live job holds the room.
async fn abort_session(
    store: &Arc<dyn RecordingStore>,
    locks: &Arc<dyn LockService>,
    engine: &Arc<dyn MediaEngineClient>,
    session: &mut RecordingSession,
    cause: &str,
) -> Result<(), RecorderError> {
    session.fail(RecordingStatus::Aborted, cause);
    store.update(session).await?;
    info!(
        target: "rc.reaper",
        recording_id = %session.recording_id,
        room_id = %session.room_id,
        cause,
        "Aborted stale recording"
    );

    match engine.list_in_progress_egress(&session.room_id).await {
        Ok(jobs) if jobs.is_empty() => {
            let key = active_recording_lock_key(&session.room_id);
            if let Err(e) = locks.release(&key).await {
                warn!(
                    target: "rc.reaper",
                    room_id = %session.room_id,
                    error = %e,
                    "Failed to release lock after aborting record"
                );
            }
        }
        Ok(_) => {
            debug!(
                target: "rc.reaper",
                room_id = %session.room_id,
                "Another live job in room, leaving lock alone"
            );
        }
        Err(e) => {
            warn!(
                target: "rc.reaper",
                room_id = %session.room_id,
                error = %e,
                "Could not verify engine state, leaving lock alone"
            );
        }
    }
    Ok(())
}
