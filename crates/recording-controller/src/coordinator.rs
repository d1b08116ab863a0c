//! Recording lifecycle coordinator.
//!
//! Owns the lock-acquire → start-job → await-activation → settle-or-timeout
//! protocol for starting a recording, and the status-dependent stop
//! protocol.
//!
//! # Settlement
//!
//! `start` races two branches:
//!
//! - the **work branch** (spawned task): issue the engine start call,
//!   then wait for the "egress active" notification on the event bus;
//! - the **timeout branch**: a plain sleep.
//!
//! Both branches funnel through a single `AtomicBool` compare-and-swap, so
//! exactly one of them resolves the call. The loser is discarded: the
//! timeout cancels only the activation *wait* (never the already-issued
//! engine request), and a work-branch result arriving after settlement is
//! logged at debug and dropped without propagating anywhere.
//!
//! # Lock discipline
//!
//! The active-recording lock is acquired before any side effect and
//! released only when we can prove no engine job is (or may still be)
//! running: immediate synchronous failures re-query the engine before
//! releasing, and the timeout path leaves the lock held when the engine
//! reports the job still starting - a late activation may yet arrive, and
//! the orphaned-lock reaper is the eventual backstop.

use crate::clients::engine::{EgressConfig, EgressStatus, MediaEngineClient};
use crate::clients::event_bus::{
    EventBus, EventSubscription, RecordingEvent, RecordingEventKind,
};
use crate::clients::lock::{active_recording_lock_key, LockService};
use crate::clients::store::RecordingStore;
use crate::errors::RecorderError;
use crate::models::{RecordingSession, RecordingStatus};
use crate::observability::metrics;
use common::types::RoomId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Timing knobs for the start protocol.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// TTL on the active-recording lock.
    pub lock_ttl: Duration,
    /// How long to wait for engine activation before failing the start.
    pub start_timeout: Duration,
}

/// Orchestrates start/stop of recordings for rooms.
///
/// Stateless apart from its collaborator handles; multiple instances across
/// multiple processes coordinate exclusively through the lock service.
pub struct RecordingCoordinator {
    engine: Arc<dyn MediaEngineClient>,
    locks: Arc<dyn LockService>,
    bus: Arc<dyn EventBus>,
    store: Arc<dyn RecordingStore>,
    config: CoordinatorConfig,
}

/// Outcome channel payload of the work branch.
type StartOutcome = Result<RecordingSession, RecorderError>;

impl RecordingCoordinator {
    #[must_use]
    pub fn new(
        engine: Arc<dyn MediaEngineClient>,
        locks: Arc<dyn LockService>,
        bus: Arc<dyn EventBus>,
        store: Arc<dyn RecordingStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            engine,
            locks,
            bus,
            store,
            config,
        }
    }

    /// Start a recording for `room_id`.
    ///
    /// # Errors
    ///
    /// - `NoParticipants` if the room has nobody to record (no lock taken)
    /// - `AlreadyStarted` if another recording is in progress (no side
    ///   effects)
    /// - `StartTimeout` if activation was not observed in time (timeout
    ///   recovery has run before this returns)
    /// - `Engine`/`Lock`/`Store`/`EventBus` for collaborator failures
    #[instrument(skip_all, fields(room_id = %room_id))]
    pub async fn start(
        &self,
        room_id: &RoomId,
        egress_config: EgressConfig,
    ) -> Result<RecordingSession, RecorderError> {
        let started_at = std::time::Instant::now();

        if !self.engine.room_has_participants(room_id).await? {
            metrics::record_start_rejected();
            return Err(RecorderError::NoParticipants(room_id.clone()));
        }

        let lock_key = active_recording_lock_key(room_id);
        if !self.locks.acquire(&lock_key, self.config.lock_ttl).await? {
            debug!(target: "rc.coordinator", room_id = %room_id, "Lock held, start rejected");
            metrics::record_start_rejected();
            return Err(RecorderError::AlreadyStarted(room_id.clone()));
        }

        // Best-effort UI signal: room clients should show "starting" even
        // if the activation webhook is later missed.
        let starting = RecordingEvent {
            room_id: room_id.clone(),
            egress_id: None,
            kind: RecordingEventKind::Starting,
        };
        if let Err(e) = self.bus.publish(&starting).await {
            debug!(
                target: "rc.coordinator",
                room_id = %room_id,
                error = %e,
                "Best-effort starting signal failed"
            );
        }

        // Subscribe before the engine call so a fast activation cannot slip
        // between start and wait.
        let subscription = self.bus.subscribe(room_id).await?;

        let settled = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(Mutex::new(None::<RecordingSession>));
        let wait_cancel = CancellationToken::new();
        let (result_tx, mut result_rx) = oneshot::channel::<StartOutcome>();

        tokio::spawn(run_work_branch(WorkBranch {
            engine: Arc::clone(&self.engine),
            locks: Arc::clone(&self.locks),
            store: Arc::clone(&self.store),
            room_id: room_id.clone(),
            lock_key: lock_key.clone(),
            egress_config,
            subscription,
            settled: Arc::clone(&settled),
            pending: Arc::clone(&pending),
            wait_cancel: wait_cancel.clone(),
            result_tx,
        }));

        let outcome = tokio::select! {
            outcome = &mut result_rx => outcome,
            () = tokio::time::sleep(self.config.start_timeout) => {
                if settle(&settled) {
                    wait_cancel.cancel();
                    let abandoned = take_pending(&pending);
                    self.recover_from_timeout(room_id, &lock_key, abandoned).await;
                    metrics::record_start_timeout();
                    metrics::record_start_duration(started_at.elapsed());
                    return Err(RecorderError::StartTimeout(room_id.clone()));
                }
                // The work branch won the settlement race at the wire;
                // its result is moments away.
                result_rx.await
            }
        };

        metrics::record_start_duration(started_at.elapsed());
        match outcome {
            Ok(Ok(session)) => {
                info!(
                    target: "rc.coordinator",
                    room_id = %room_id,
                    recording_id = %session.recording_id,
                    status = ?session.status,
                    "Recording started"
                );
                metrics::record_recording_started();
                Ok(session)
            }
            Ok(Err(e)) => {
                metrics::record_start_error();
                Err(e)
            }
            Err(_) => {
                metrics::record_start_error();
                Err(RecorderError::Engine(
                    "start task exited without settling".to_string(),
                ))
            }
        }
    }

    /// Stop a recording by id.
    ///
    /// # Errors
    ///
    /// - `NotFound` for an unknown recording or a vanished engine job
    /// - `AlreadyStopped` if the session already reached a terminal state
    /// - `CannotStopWhileStarting` if the job has not yet activated; an
    ///   engine stop is issued anyway and the caller should retry shortly
    #[instrument(skip_all, fields(recording_id = %recording_id))]
    pub async fn stop(
        &self,
        recording_id: &common::types::RecordingId,
    ) -> Result<RecordingSession, RecorderError> {
        let Some(mut session) = self.store.find(recording_id).await? else {
            return Err(RecorderError::NotFound(recording_id.clone()));
        };

        if session.status.is_terminal() {
            return Err(RecorderError::AlreadyStopped(recording_id.clone()));
        }

        let Some(egress_id) = session.egress_id.clone() else {
            // In-progress without a job id cannot happen through this
            // coordinator; treat the record as already settled.
            return Err(RecorderError::AlreadyStopped(recording_id.clone()));
        };

        let Some(job) = self.engine.get_egress(&session.room_id, &egress_id).await? else {
            return Err(RecorderError::NotFound(recording_id.clone()));
        };

        match job.status {
            EgressStatus::Active => {
                let stopped = self.engine.stop_egress(&egress_id).await?;
                let new_status = match stopped {
                    Some(info) if !info.status.is_in_progress() => {
                        RecordingStatus::from(info.status)
                    }
                    _ => RecordingStatus::Ending,
                };
                session.transition(new_status);
                self.store.update(&session).await?;

                let lock_key = active_recording_lock_key(&session.room_id);
                if let Err(e) = self.locks.release(&lock_key).await {
                    warn!(
                        target: "rc.coordinator",
                        room_id = %session.room_id,
                        error = %e,
                        "Failed to release lock after stop; reaper will reclaim"
                    );
                }

                info!(
                    target: "rc.coordinator",
                    recording_id = %recording_id,
                    status = ?session.status,
                    "Recording stopped"
                );
                metrics::record_recording_stopped();
                Ok(session)
            }
            EgressStatus::Starting => {
                // Stop anyway so a dangling starting job cannot outlive the
                // caller's intent; the caller retries once activation (or
                // the abort) lands.
                if let Err(e) = self.engine.stop_egress(&egress_id).await {
                    warn!(
                        target: "rc.coordinator",
                        recording_id = %recording_id,
                        error = %e,
                        "Stop request for starting job failed"
                    );
                }
                Err(RecorderError::CannotStopWhileStarting(recording_id.clone()))
            }
            _ => {
                // The engine finished it behind our back; sync the record.
                session.transition(RecordingStatus::from(job.status));
                if let Err(e) = self.store.update(&session).await {
                    warn!(
                        target: "rc.coordinator",
                        recording_id = %recording_id,
                        error = %e,
                        "Failed to sync finished session"
                    );
                }
                Err(RecorderError::AlreadyStopped(recording_id.clone()))
            }
        }
    }

    /// Clean up after the timeout branch won the settlement race.
    ///
    /// With no engine job the start never truly happened: persist a
    /// synthesized failure and release the lock unconditionally. With a
    /// job, mark it failed and try to stop it; the lock is released only
    /// when the engine confirms the job is gone, because a concurrent late
    /// activation may still arrive for a job reported as starting.
    async fn recover_from_timeout(
        &self,
        room_id: &RoomId,
        lock_key: &str,
        abandoned: Option<RecordingSession>,
    ) {
        match abandoned {
            None => {
                let session = RecordingSession::failed_unstarted(
                    room_id.clone(),
                    format!(
                        "engine produced no job within {}s",
                        self.config.start_timeout.as_secs()
                    ),
                );
                if let Err(e) = self.store.create(&session).await {
                    warn!(
                        target: "rc.coordinator",
                        room_id = %room_id,
                        error = %e,
                        "Failed to persist synthesized failure"
                    );
                }
                if let Err(e) = self.locks.release(lock_key).await {
                    warn!(
                        target: "rc.coordinator",
                        room_id = %room_id,
                        error = %e,
                        "Failed to release lock after unstarted timeout"
                    );
                }
            }
            Some(mut session) => {
                session.fail(
                    RecordingStatus::Failed,
                    "activation not observed before timeout",
                );
                if let Err(e) = self.store.update(&session).await {
                    warn!(
                        target: "rc.coordinator",
                        recording_id = %session.recording_id,
                        error = %e,
                        "Failed to mark timed-out session failed"
                    );
                }

                let Some(egress_id) = session.egress_id else {
                    if let Err(e) = self.locks.release(lock_key).await {
                        warn!(
                            target: "rc.coordinator",
                            room_id = %room_id,
                            error = %e,
                            "Failed to release lock"
                        );
                    }
                    return;
                };

                match self.engine.stop_egress(&egress_id).await {
                    Ok(None) => {
                        // Engine does not know the job; safe to release.
                        if let Err(e) = self.locks.release(lock_key).await {
                            warn!(
                                target: "rc.coordinator",
                                room_id = %room_id,
                                error = %e,
                                "Failed to release lock"
                            );
                        }
                    }
                    Ok(Some(info)) if info.status == EgressStatus::Starting => {
                        // A concurrent completion may still arrive; the
                        // orphaned-lock reaper reclaims the lock after its
                        // grace period if it never does.
                        info!(
                            target: "rc.coordinator",
                            room_id = %room_id,
                            egress_id = %egress_id,
                            "Job still starting at timeout, leaving lock held"
                        );
                    }
                    Ok(Some(_)) => {
                        if let Err(e) = self.locks.release(lock_key).await {
                            warn!(
                                target: "rc.coordinator",
                                room_id = %room_id,
                                error = %e,
                                "Failed to release lock"
                            );
                        }
                    }
                    Err(e) => {
                        warn!(
                            target: "rc.coordinator",
                            room_id = %room_id,
                            egress_id = %egress_id,
                            error = %e,
                            "Stop request during timeout recovery failed, leaving lock held"
                        );
                    }
                }
            }
        }
    }
}

/// Everything the spawned work branch owns.
struct WorkBranch {
    engine: Arc<dyn MediaEngineClient>,
    locks: Arc<dyn LockService>,
    store: Arc<dyn RecordingStore>,
    room_id: RoomId,
    lock_key: String,
    egress_config: EgressConfig,
    subscription: EventSubscription,
    settled: Arc<AtomicBool>,
    pending: Arc<Mutex<Option<RecordingSession>>>,
    wait_cancel: CancellationToken,
    result_tx: oneshot::Sender<StartOutcome>,
}

/// The work branch of `start`: issue the engine call, persist the session,
/// then await activation. Every exit path goes through the settlement CAS;
/// a losing result is logged and dropped.
async fn run_work_branch(branch: WorkBranch) {
    let WorkBranch {
        engine,
        locks,
        store,
        room_id,
        lock_key,
        egress_config,
        mut subscription,
        settled,
        pending,
        wait_cancel,
        result_tx,
    } = branch;

    // The engine request itself is never cancelled by the timeout; only
    // the activation wait below is.
    let info = match engine.start_egress(&room_id, &egress_config).await {
        Ok(info) => info,
        Err(e) => {
            if settle(&settled) {
                release_lock_if_no_live_job(&locks, &engine, &room_id, &lock_key).await;
                let _ = result_tx.send(Err(e));
            } else {
                debug!(
                    target: "rc.coordinator",
                    room_id = %room_id,
                    error = %e,
                    "Engine start failed after settlement, discarding"
                );
            }
            return;
        }
    };

    // A settlement while the engine call was in flight means timeout
    // recovery already ran without knowledge of this job. Persisting a
    // record now would leave a second in-progress session behind, so stop
    // the job instead of recording it.
    if settled.load(Ordering::SeqCst) {
        debug!(
            target: "rc.coordinator",
            room_id = %room_id,
            egress_id = %info.egress_id,
            "Engine responded after settlement, stopping abandoned job"
        );
        if let Err(e) = engine.stop_egress(&info.egress_id).await {
            warn!(
                target: "rc.coordinator",
                room_id = %room_id,
                egress_id = %info.egress_id,
                error = %e,
                "Stop request for post-settlement job failed"
            );
        }
        return;
    }

    let mut session = RecordingSession::starting(room_id.clone(), info.egress_id.clone());
    if let Err(e) = store.create(&session).await {
        if settle(&settled) {
            release_lock_if_no_live_job(&locks, &engine, &room_id, &lock_key).await;
            let _ = result_tx.send(Err(e));
        } else {
            debug!(
                target: "rc.coordinator",
                room_id = %room_id,
                error = %e,
                "Store create failed after settlement, discarding"
            );
        }
        return;
    }

    // Hand the session to the timeout branch for potential recovery.
    set_pending(&pending, session.clone());

    // The start call can return an already-active job (engine raced ahead
    // of us); settle immediately without waiting on the bus.
    if info.status == EgressStatus::Active {
        session.transition(RecordingStatus::Active);
        if let Err(e) = store.update(&session).await {
            warn!(
                target: "rc.coordinator",
                recording_id = %session.recording_id,
                error = %e,
                "Failed to persist immediate activation"
            );
        }
        if settle(&settled) {
            let _ = result_tx.send(Ok(session));
        } else {
            debug!(
                target: "rc.coordinator",
                room_id = %room_id,
                "Immediate activation lost the settlement race, discarding"
            );
        }
        return;
    }

    loop {
        tokio::select! {
            () = wait_cancel.cancelled() => {
                // Timeout branch settled; dropping the subscription here is
                // the unsubscribe.
                debug!(
                    target: "rc.coordinator",
                    room_id = %room_id,
                    "Activation wait cancelled after settlement"
                );
                return;
            }
            event = subscription.recv() => {
                match event {
                    Some(event) if event.activates(&room_id, &info.egress_id) => {
                        session.transition(RecordingStatus::Active);
                        if let Err(e) = store.update(&session).await {
                            warn!(
                                target: "rc.coordinator",
                                recording_id = %session.recording_id,
                                error = %e,
                                "Failed to persist activation"
                            );
                        }
                        if settle(&settled) {
                            let _ = result_tx.send(Ok(session));
                        } else {
                            debug!(
                                target: "rc.coordinator",
                                room_id = %room_id,
                                "Activation lost the settlement race, discarding"
                            );
                        }
                        return;
                    }
                    Some(_) => {
                        // Unrelated event for this room (e.g. our own
                        // Starting signal); keep waiting.
                    }
                    None => {
                        if settle(&settled) {
                            let _ = result_tx.send(Err(RecorderError::EventBus(
                                "subscription closed before activation".to_string(),
                            )));
                        }
                        return;
                    }
                }
            }
        }
    }
}

/// Release the room's lock unless a fresh engine query shows a live job.
/// Verification failure keeps the lock: the reaper releases it later if
/// nothing real is behind it.
async fn release_lock_if_no_live_job(
    locks: &Arc<dyn LockService>,
    engine: &Arc<dyn MediaEngineClient>,
    room_id: &RoomId,
    lock_key: &str,
) {
    match engine.list_in_progress_egress(room_id).await {
        Ok(jobs) if jobs.is_empty() => {
            if let Err(e) = locks.release(lock_key).await {
                warn!(
                    target: "rc.coordinator",
                    room_id = %room_id,
                    error = %e,
                    "Failed to release lock after start failure"
                );
            }
        }
        Ok(_) => {
            info!(
                target: "rc.coordinator",
                room_id = %room_id,
                "Live engine job found, keeping lock despite start failure"
            );
        }
        Err(e) => {
            warn!(
                target: "rc.coordinator",
                room_id = %room_id,
                error = %e,
                "Could not verify engine state, keeping lock for the reaper"
            );
        }
    }
}

/// Exactly-once settlement guard. Returns `true` for the single caller
/// that wins.
fn settle(settled: &AtomicBool) -> bool {
    settled
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
}

fn set_pending(pending: &Mutex<Option<RecordingSession>>, session: RecordingSession) {
    let mut slot = match pending.lock() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    *slot = Some(session);
}

fn take_pending(pending: &Mutex<Option<RecordingSession>>) -> Option<RecordingSession> {
    let mut slot = match pending.lock() {
        Ok(slot) => slot,
        Err(poisoned) => poisoned.into_inner(),
    };
    slot.take()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_settlement_is_exactly_once() {
        let flag = AtomicBool::new(false);
        assert!(settle(&flag));
        assert!(!settle(&flag));
        assert!(!settle(&flag));
    }

    #[test]
    fn test_pending_slot_take_is_destructive() {
        let pending = Mutex::new(None);
        assert!(take_pending(&pending).is_none());

        set_pending(
            &pending,
            RecordingSession::failed_unstarted(RoomId::new("room-1"), "cause"),
        );
        assert!(take_pending(&pending).is_some());
        assert!(take_pending(&pending).is_none());
    }
}
