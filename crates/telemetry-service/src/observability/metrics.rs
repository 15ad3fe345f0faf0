//! Metrics definitions for the telemetry service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `telemetry_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `operation`: bounded by the configured groups; anything else is `other`
//! - `outcome`: `allowed`, `unauthenticated`, `denied`
//! - `stream`: `logging`, `statistics`

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
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Shutdown waits on every subscriber task; usually well under a second
        .set_buckets_for_metric(
            Matcher::Full("telemetry_shutdown_duration_seconds".to_string()),
            &[0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000, 5.000, 30.000],
        )
        .map_err(|e| format!("Failed to set shutdown duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Call Metrics (Counters)
// ============================================================================

/// Record the outcome of one inbound call.
///
/// Metric: `telemetry_calls_total`
/// Labels: `operation`, `outcome`
///
/// Callers pass `"other"` as the operation for paths outside the configured
/// groups.
pub fn record_call(operation: &str, outcome: &'static str) {
    counter!(
        "telemetry_calls_total",
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Record events dropped because a log subscriber's inbox was full.
///
/// Metric: `telemetry_events_dropped_total`
/// Labels: none
pub fn record_events_dropped(count: u64) {
    counter!("telemetry_events_dropped_total").increment(count);
}

/// Record a failed write to a subscriber stream.
///
/// Metric: `telemetry_delivery_failures_total`
/// Labels: `stream` (logging, statistics)
pub fn record_delivery_failure(stream: &'static str) {
    counter!("telemetry_delivery_failures_total", "stream" => stream).increment(1);
}

// ============================================================================
// Subscriber Metrics (Gauges)
// ============================================================================

/// Set the number of attached log subscribers.
///
/// Metric: `telemetry_log_subscribers_active`
pub fn set_log_subscribers_active(count: usize) {
    // usize to f64 conversion is safe for realistic subscriber counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("telemetry_log_subscribers_active").set(count as f64);
}

/// Set the number of attached statistics subscribers.
///
/// Metric: `telemetry_stat_subscribers_active`
pub fn set_stat_subscribers_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("telemetry_stat_subscribers_active").set(count as f64);
}

// ============================================================================
// Lifecycle Metrics (Histograms)
// ============================================================================

/// Record how long subscriber shutdown took.
///
/// Metric: `telemetry_shutdown_duration_seconds`
pub fn record_shutdown_duration(duration: Duration) {
    histogram!("telemetry_shutdown_duration_seconds").record(duration.as_secs_f64());
}
