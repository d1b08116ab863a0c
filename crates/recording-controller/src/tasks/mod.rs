//! Background reaper tasks.
//!
//! Two periodic sweeps back up the coordinator's best-effort cleanup:
//!
//! - [`orphaned_lock_reaper`] releases active-recording locks whose engine
//!   job is gone;
//! - [`stale_recording_reaper`] settles session records the webhook flow
//!   stopped updating.
//!
//! Both sweeps are idempotent and safe to run concurrently from multiple
//! controller instances: every action re-checks the authoritative state
//! (Redis, the engine) immediately before acting, and acting on an item
//! another instance already handled is a no-op.
//!
//! # Graceful Shutdown
//!
//! Each loop runs under a cancellation token. When the token fires, the
//! loop finishes its current sweep and exits cleanly.

pub mod orphaned_lock_reaper;
pub mod stale_recording_reaper;

use crate::errors::RecorderError;
use crate::observability::metrics;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outcome of one reaper sweep.
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Items enumerated by this sweep.
    pub examined: usize,
    /// Items reclaimed (locks released, sessions settled).
    pub reclaimed: usize,
    /// Items inspected and deliberately left alone.
    pub kept: usize,
    /// Per-item failures; the sweep continued past each of them.
    pub failures: Vec<(String, RecorderError)>,
}

impl SweepReport {
    /// Whether the sweep did anything worth surfacing above debug level.
    #[must_use]
    pub fn is_noteworthy(&self) -> bool {
        self.reclaimed > 0 || !self.failures.is_empty()
    }
}

/// Run a reaper sweep on a fixed interval until cancelled.
///
/// A sweep that fails outright (enumeration error) is logged and retried
/// on the next tick; missed ticks are skipped rather than bursted so a
/// slow sweep never queues up followers.
pub async fn run_reaper_loop<F, Fut>(
    reaper: &'static str,
    interval: Duration,
    cancel_token: CancellationToken,
    sweep_fn: F,
) where
    F: Fn() -> Fut + Send,
    Fut: Future<Output = Result<SweepReport, RecorderError>> + Send,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(target: "rc.reaper", reaper, interval_secs = interval.as_secs(), "Reaper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match sweep_fn().await {
                    Ok(report) => {
                        metrics::record_reaper_sweep(reaper, &report);
                        if report.is_noteworthy() {
                            warn_or_info(reaper, &report);
                        } else {
                            debug!(
                                target: "rc.reaper",
                                reaper,
                                examined = report.examined,
                                "Sweep completed, nothing to do"
                            );
                        }
                    }
                    Err(e) => {
                        error!(target: "rc.reaper", reaper, error = %e, "Sweep failed");
                        metrics::record_reaper_sweep_error(reaper);
                    }
                }
            }
            _ = cancel_token.cancelled() => {
                info!(target: "rc.reaper", reaper, "Reaper received shutdown signal, exiting");
                break;
            }
        }
    }
}

/// Owns the background reaper loops.
///
/// Reapers are registered explicitly at startup; the scheduler spawns one
/// loop per registration under child tokens of its shutdown token, and
/// `join` drains them after the token fires. Overlapping sweeps are
/// tolerated by design (sweeps are idempotent), so the scheduler never
/// serializes registrations against each other.
pub struct Scheduler {
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    #[must_use]
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            handles: Vec::new(),
        }
    }

    /// Register a sweep to run every `interval` until shutdown.
    pub fn schedule<F, Fut>(&mut self, reaper: &'static str, interval: Duration, sweep_fn: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<SweepReport, RecorderError>> + Send + 'static,
    {
        let token = self.cancel_token.child_token();
        self.handles.push(tokio::spawn(run_reaper_loop(
            reaper, interval, token, sweep_fn,
        )));
    }

    /// Wait for every registered loop to exit. Call after cancelling the
    /// shutdown token.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(target: "rc.reaper", error = %e, "Reaper task did not exit cleanly");
            }
        }
    }
}

fn warn_or_info(reaper: &'static str, report: &SweepReport) {
    if report.failures.is_empty() {
        info!(
            target: "rc.reaper",
            reaper,
            examined = report.examined,
            reclaimed = report.reclaimed,
            kept = report.kept,
            "Sweep reclaimed items"
        );
    } else {
        for (item, error) in &report.failures {
            warn!(target: "rc.reaper", reaper, item = %item, error = %error, "Sweep item failed");
        }
        warn!(
            target: "rc.reaper",
            reaper,
            examined = report.examined,
            reclaimed = report.reclaimed,
            kept = report.kept,
            failures = report.failures.len(),
            "Sweep completed with failures"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_is_not_noteworthy() {
        assert!(!SweepReport::default().is_noteworthy());
    }

    #[test]
    fn test_reclaims_and_failures_are_noteworthy() {
        let report = SweepReport {
            examined: 3,
            reclaimed: 1,
            ..SweepReport::default()
        };
        assert!(report.is_noteworthy());

        let report = SweepReport {
            examined: 3,
            failures: vec![(
                "recording:lock:room-1".to_string(),
                RecorderError::Lock("boom".to_string()),
            )],
            ..SweepReport::default()
        };
        assert!(report.is_noteworthy());
    }
}
