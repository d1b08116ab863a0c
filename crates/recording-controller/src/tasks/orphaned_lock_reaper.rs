//! Orphaned-lock reaper.
//!
//! An active-recording lock normally dies with its recording: the
//! coordinator releases it on stop, on start failure, or on timeout. A
//! crash (or a timeout that left a still-starting job behind) can strand
//! the lock, blocking the room until the TTL expires. This sweep finds
//! locks older than a grace period and releases them unless the room is
//! demonstrably recording: the room must exist, have at least one
//! participant, and have a live engine job for the lock to survive.
//!
//! The grace period exists so the reaper never races a start in flight:
//! a lock younger than the grace period is always left alone, even when
//! the engine reports nothing yet.

use crate::clients::engine::MediaEngineClient;
use crate::clients::lock::{
    room_id_from_lock_key, LockEntry, LockService, ACTIVE_RECORDING_LOCK_PREFIX,
};
use crate::errors::RecorderError;
use crate::tasks::SweepReport;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// What a single lock examination decided.
enum LockVerdict {
    Released,
    Kept,
}

/// Releases locks whose engine job has vanished.
pub struct OrphanedLockReaper {
    locks: Arc<dyn LockService>,
    engine: Arc<dyn MediaEngineClient>,
    /// Minimum lock age before the reaper will touch it.
    grace_period: Duration,
    /// Locks examined concurrently per batch.
    batch_size: usize,
}

impl OrphanedLockReaper {
    #[must_use]
    pub fn new(
        locks: Arc<dyn LockService>,
        engine: Arc<dyn MediaEngineClient>,
        grace_period: Duration,
        batch_size: usize,
    ) -> Self {
        Self {
            locks,
            engine,
            grace_period,
            batch_size: batch_size.max(1),
        }
    }

    /// Run one sweep over every active-recording lock.
    ///
    /// Per-item failures are collected in the report; only enumeration
    /// failure aborts the sweep.
    ///
    /// # Errors
    ///
    /// Returns `RecorderError::Lock` if the lock enumeration fails.
    pub async fn sweep(&self) -> Result<SweepReport, RecorderError> {
        let entries = self
            .locks
            .list_by_prefix(ACTIVE_RECORDING_LOCK_PREFIX)
            .await?;

        let mut report = SweepReport {
            examined: entries.len(),
            ..SweepReport::default()
        };

        let grace =
            chrono::Duration::from_std(self.grace_period).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let (eligible, within_grace): (Vec<LockEntry>, Vec<LockEntry>) = entries
            .into_iter()
            .partition(|entry| now - entry.created_at >= grace);

        report.kept += within_grace.len();
        if !within_grace.is_empty() {
            debug!(
                target: "rc.reaper",
                count = within_grace.len(),
                "Locks within grace period, skipping"
            );
        }

        for chunk in eligible.chunks(self.batch_size) {
            let mut batch: JoinSet<(String, Result<LockVerdict, RecorderError>)> = JoinSet::new();
            for entry in chunk {
                let locks = Arc::clone(&self.locks);
                let engine = Arc::clone(&self.engine);
                let grace_period = self.grace_period;
                let entry = entry.clone();
                batch.spawn(async move {
                    let verdict = examine_lock(&locks, &engine, &entry, grace_period).await;
                    (entry.key, verdict)
                });
            }

            while let Some(joined) = batch.join_next().await {
                match joined {
                    Ok((_, Ok(LockVerdict::Released))) => report.reclaimed += 1,
                    Ok((_, Ok(LockVerdict::Kept))) => report.kept += 1,
                    Ok((key, Err(e))) => report.failures.push((key, e)),
                    Err(e) => report.failures.push((
                        "<batch task>".to_string(),
                        RecorderError::Lock(format!("examination task failed: {e}")),
                    )),
                }
            }
        }

        Ok(report)
    }
}

/// Decide the fate of one out-of-grace lock.
///
/// Re-reads the lock before acting: the holder may have released it (and a
/// new recording re-acquired it) since enumeration.
async fn examine_lock(
    locks: &Arc<dyn LockService>,
    engine: &Arc<dyn MediaEngineClient>,
    entry: &LockEntry,
    grace_period: Duration,
) -> Result<LockVerdict, RecorderError> {
    let Some(room_id) = room_id_from_lock_key(&entry.key) else {
        warn!(target: "rc.reaper", key = %entry.key, "Unparseable lock key under prefix, skipping");
        return Ok(LockVerdict::Kept);
    };

    // Fresh read: a vanished or re-acquired lock is no longer ours to judge.
    let grace =
        chrono::Duration::from_std(grace_period).unwrap_or(chrono::Duration::MAX);
    match locks.created_at(&entry.key).await? {
        None => {
            debug!(target: "rc.reaper", key = %entry.key, "Lock vanished before examination");
            return Ok(LockVerdict::Kept);
        }
        Some(created_at) if Utc::now() - created_at < grace => {
            debug!(target: "rc.reaper", key = %entry.key, "Lock re-acquired, skipping");
            return Ok(LockVerdict::Kept);
        }
        Some(_) => {}
    }

    // The lock survives only when the room is demonstrably recording:
    // present, populated, and with a live engine job. Short-circuits keep
    // the engine round-trips to the minimum.
    let recording_live = engine.room_exists(&room_id).await?
        && engine.room_has_participants(&room_id).await?
        && !engine.list_in_progress_egress(&room_id).await?.is_empty();
    if recording_live {
        debug!(
            target: "rc.reaper",
            room_id = %room_id,
            "Room is recording, keeping lock"
        );
        return Ok(LockVerdict::Kept);
    }

    locks.release(&entry.key).await?;
    info!(
        target: "rc.reaper",
        room_id = %room_id,
        key = %entry.key,
        age_secs = (Utc::now() - entry.created_at).num_seconds(),
        "Released orphaned lock"
    );
    Ok(LockVerdict::Released)
}
