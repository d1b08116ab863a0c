//! Metrics definitions for the Recording Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rc_` prefix for Recording Controller
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `result`: start outcomes (started, timeout, rejected, error)
//! - `reaper`: 2 values (orphaned_locks, stale_recordings)
//!
//! Recording and room ids are never used as labels.

use crate::tasks::SweepReport;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the Prometheus recorder fails to install (e.g.,
/// already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Start settlement latency: most settle well inside the activation
        // timeout, the long tail sits right at it.
        .set_buckets_for_metric(
            Matcher::Prefix("rc_start_duration".to_string()),
            &[
                0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000, 30.000,
            ],
        )
        .map_err(|e| format!("Failed to set start duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// Coordinator Metrics
// ============================================================================

/// Record a successfully started recording.
///
/// Metric: `rc_starts_total{result="started"}`
pub fn record_recording_started() {
    counter!("rc_starts_total", "result" => "started").increment(1);
}

/// Record a start that timed out waiting for activation.
///
/// Metric: `rc_starts_total{result="timeout"}`
pub fn record_start_timeout() {
    counter!("rc_starts_total", "result" => "timeout").increment(1);
}

/// Record a start rejected before any side effect (lock held, no
/// participants).
///
/// Metric: `rc_starts_total{result="rejected"}`
pub fn record_start_rejected() {
    counter!("rc_starts_total", "result" => "rejected").increment(1);
}

/// Record a start that failed on a collaborator error.
///
/// Metric: `rc_starts_total{result="error"}`
pub fn record_start_error() {
    counter!("rc_starts_total", "result" => "error").increment(1);
}

/// Record how long a start took to settle, whichever way it settled.
///
/// Metric: `rc_start_duration_seconds`
pub fn record_start_duration(duration: Duration) {
    histogram!("rc_start_duration_seconds").record(duration.as_secs_f64());
}

/// Record a successfully stopped recording.
///
/// Metric: `rc_stops_total`
pub fn record_recording_stopped() {
    counter!("rc_stops_total").increment(1);
}

// ============================================================================
// Reaper Metrics
// ============================================================================

/// Record the outcome of one reaper sweep.
///
/// Metrics: `rc_reaper_sweeps_total{reaper}`,
/// `rc_reaper_reclaimed_total{reaper}`,
/// `rc_reaper_item_failures_total{reaper}`,
/// `rc_reaper_last_examined{reaper}`
pub fn record_reaper_sweep(reaper: &'static str, report: &SweepReport) {
    counter!("rc_reaper_sweeps_total", "reaper" => reaper).increment(1);
    counter!("rc_reaper_reclaimed_total", "reaper" => reaper)
        .increment(report.reclaimed as u64);
    counter!("rc_reaper_item_failures_total", "reaper" => reaper)
        .increment(report.failures.len() as u64);
    gauge!("rc_reaper_last_examined", "reaper" => reaper).set(report.examined as f64);
}

/// Record a sweep that failed before examining any item.
///
/// Metric: `rc_reaper_sweep_errors_total{reaper}`
pub fn record_reaper_sweep_error(reaper: &'static str) {
    counter!("rc_reaper_sweep_errors_total", "reaper" => reaper).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // Recording helpers must not panic when no recorder is installed.
    #[test]
    fn test_metrics_noop_without_recorder() {
        record_recording_started();
        record_start_timeout();
        record_start_rejected();
        record_start_error();
        record_start_duration(Duration::from_millis(250));
        record_recording_stopped();
        record_reaper_sweep("orphaned_locks", &SweepReport::default());
        record_reaper_sweep_error("stale_recordings");
    }
}
