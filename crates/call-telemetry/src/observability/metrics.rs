//! Metrics definitions for the telemetry core.
//!
//! All metrics follow Prometheus naming conventions:
//! - `telemetry_` prefix
//! - `_total` suffix for counters
//!
//! The embedding service installs the recorder/exporter; without one these
//! calls are no-ops.

use metrics::{counter, gauge};

/// Record an authorization decision.
///
/// Metric: `telemetry_calls_total`
/// Labels: `outcome` (allowed, unauthenticated, permission_denied)
pub fn record_call(outcome: &'static str) {
    counter!("telemetry_calls_total", "outcome" => outcome).increment(1);
}

/// Record one event placed on a subscriber queue.
///
/// Metric: `telemetry_events_delivered_total`
/// Labels: `hub` (log, stat)
pub fn record_event_delivered(hub: &'static str) {
    counter!("telemetry_events_delivered_total", "hub" => hub).increment(1);
}

/// Set the current number of subscribers attached to a hub.
///
/// Metric: `telemetry_subscribers_active`
/// Labels: `hub` (log, stat)
pub fn set_subscribers_active(hub: &'static str, count: usize) {
    // usize to f64 conversion is safe for realistic subscriber counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("telemetry_subscribers_active", "hub" => hub).set(count as f64);
}

/// Record a subscriber removed from a hub by the dispatch loop.
///
/// Metric: `telemetry_subscribers_evicted_total`
/// Labels: `hub` (log, stat), `reason` (timeout, closed)
///
/// Non-zero `timeout` values mean subscribers are not keeping up.
pub fn record_subscriber_evicted(hub: &'static str, reason: &'static str) {
    counter!("telemetry_subscribers_evicted_total", "hub" => hub, "reason" => reason)
        .increment(1);
}

/// Record a stat window snapshot handed to its caller.
///
/// Metric: `telemetry_windows_emitted_total`
pub fn record_window_emitted() {
    counter!("telemetry_windows_emitted_total").increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_metrics_are_recorded_with_expected_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_call("allowed");
            record_call("allowed");
            record_call("permission_denied");
            record_event_delivered("log");
            set_subscribers_active("stat", 3);
            record_subscriber_evicted("log", "timeout");
            record_window_emitted();
        });

        let recorded = snapshotter.snapshot().into_vec();
        let names: Vec<String> = recorded
            .iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        for expected in [
            "telemetry_calls_total",
            "telemetry_events_delivered_total",
            "telemetry_subscribers_active",
            "telemetry_subscribers_evicted_total",
            "telemetry_windows_emitted_total",
        ] {
            assert!(
                names.iter().any(|n| n == expected),
                "missing metric {expected}, got {names:?}"
            );
        }

        let allowed = recorded.iter().find(|(key, _, _, _)| {
            key.key().name() == "telemetry_calls_total"
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == "outcome" && l.value() == "allowed")
        });
        assert!(matches!(allowed, Some((_, _, _, DebugValue::Counter(2)))));
    }

    #[test]
    fn test_calls_without_recorder_are_noops() {
        record_call("unauthenticated");
        record_event_delivered("stat");
        set_subscribers_active("log", 0);
        record_subscriber_evicted("stat", "closed");
        record_window_emitted();
    }
}
