//! Metrics definitions for the signal service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `signal_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `message_type`: inbound envelope tags (~10 values)
//! - `outcome`: handling outcomes and auth outcomes (< 10 values each)
//! - `reason`: `full`, `closed`
//! - `from` / `to`: call statuses (6 values)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize the Prometheus recorder and return the handle used to render
/// `/metrics`.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Envelope handling is in-process plus one store round trip
        .set_buckets_for_metric(
            Matcher::Prefix("signal_envelope".to_string()),
            &[
                0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set envelope duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Set the number of live sessions.
///
/// Metric: `signal_sessions_active`
pub fn set_sessions_active(count: usize) {
    // usize to f64 conversion is safe for realistic session counts (< 2^53)
    #[allow(clippy::cast_precision_loss)]
    gauge!("signal_sessions_active").set(count as f64);
}

/// Set the number of non-empty channels.
///
/// Metric: `signal_channels_active`
pub fn set_channels_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("signal_channels_active").set(count as f64);
}

// ============================================================================
// Envelope handling
// ============================================================================

/// Count one handled inbound envelope.
///
/// Metric: `signal_envelopes_total`
/// Labels: `message_type`, `outcome`
pub fn record_envelope(message_type: &'static str, outcome: &'static str) {
    counter!(
        "signal_envelopes_total",
        "message_type" => message_type,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record how long one inbound envelope took to handle.
///
/// Metric: `signal_envelope_duration_seconds`
/// Labels: `message_type`
pub fn record_envelope_duration(message_type: &'static str, duration: Duration) {
    histogram!("signal_envelope_duration_seconds", "message_type" => message_type)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Fan-out
// ============================================================================

/// Count frames enqueued to session queues.
///
/// Metric: `signal_deliveries_total`
pub fn record_deliveries(count: usize) {
    counter!("signal_deliveries_total").increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Count a frame that could not be enqueued.
///
/// Metric: `signal_dropped_deliveries_total`
/// Labels: `reason` (`full`, `closed`)
pub fn record_dropped_delivery(reason: &'static str) {
    counter!("signal_dropped_deliveries_total", "reason" => reason).increment(1);
}

// ============================================================================
// Policy
// ============================================================================

/// Count a chat message denied by the usage gate.
///
/// Metric: `signal_quota_denials_total`
pub fn record_quota_denied() {
    counter!("signal_quota_denials_total").increment(1);
}

/// Count an applied call status transition.
///
/// Metric: `signal_call_transitions_total`
/// Labels: `from`, `to`
pub fn record_call_transition(from: &'static str, to: &'static str) {
    counter!("signal_call_transitions_total", "from" => from, "to" => to).increment(1);
}

/// Count a handshake authentication outcome.
///
/// Metric: `signal_auth_total`
/// Labels: `outcome`
pub fn record_auth_outcome(outcome: &'static str) {
    counter!("signal_auth_total", "outcome" => outcome).increment(1);
}
