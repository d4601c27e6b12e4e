//! Metrics definitions for the ReadQueue service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `rq_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded to prevent cardinality explosion:
//! - `method`: HTTP methods
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `status`: success, error, timeout (or an error code for queue joins)
//! - `action`: start, skip, finish
//! - `kind`: offer, answer, ice-candidate
//!
//! Group names and session ids are never used as labels.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder and return its render handle.
///
/// Can only succeed once per process.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `rq_http_requests_total`, `rq_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("rq_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("rq_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Categorize HTTP status code into success/error/timeout
fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Normalize endpoint path to prevent label cardinality explosion
///
/// Replaces session ids and group names with placeholders.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/health" => "/health",
        "/api/health" => "/api/health",
        "/metrics" => "/metrics",
        "/api/subgroups/create" => "/api/subgroups/create",
        "/api/subgroups/list" => "/api/subgroups/list",
        "/api/queue/join" => "/api/queue/join",
        "/api/queue/action" => "/api/queue/action",
        "/api/queue/all" => "/api/queue/all",
        "/api/webrtc/signal" => "/api/webrtc/signal",
        "/api/webrtc/peers" => "/api/webrtc/peers",
        _ => normalize_dynamic_endpoint(path),
    }
}

fn normalize_dynamic_endpoint(path: &str) -> &'static str {
    const DYNAMIC: &[(&str, &str)] = &[
        ("/api/subgroups/delete/", "/api/subgroups/delete/{name}"),
        ("/api/queue/status/", "/api/queue/status/{sessionId}"),
        ("/api/queue/leave/", "/api/queue/leave/{sessionId}"),
        ("/api/queue/clear/", "/api/queue/clear/{subGroup}"),
        ("/api/webrtc/signals/", "/api/webrtc/signals/{sessionId}"),
    ];

    DYNAMIC
        .iter()
        .find(|(prefix, _)| {
            path.strip_prefix(prefix)
                .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
        })
        .map_or("/other", |&(_, normalized)| normalized)
}

// ============================================================================
// Queue Metrics
// ============================================================================

/// Record a join attempt
///
/// Metric: `rq_queue_joins_total`
/// Labels: `status` (success, or the error code on failure)
pub fn record_queue_join(status: &'static str) {
    counter!("rq_queue_joins_total", "status" => status).increment(1);
}

/// Record a participant action
///
/// Metric: `rq_queue_actions_total`
/// Labels: `action`
pub fn record_queue_action(action: &'static str) {
    counter!("rq_queue_actions_total", "action" => action).increment(1);
}

/// Record participants removed by leave, clear, or group deletion
///
/// Metric: `rq_queue_departures_total`
/// Labels: `reason` (leave, clear, group_deleted)
pub fn record_queue_departures(reason: &'static str, count: u64) {
    counter!("rq_queue_departures_total", "reason" => reason).increment(count);
}

// ============================================================================
// Reaper Metrics
// ============================================================================

/// Record a completed reaper sweep
///
/// Metric: `rq_reaper_sweeps_total`, `rq_groups_reaped_total`
/// Labels: `status` (success, error)
pub fn record_reaper_sweep(status: &'static str, reaped: usize) {
    counter!("rq_reaper_sweeps_total", "status" => status).increment(1);
    counter!("rq_groups_reaped_total").increment(reaped as u64);
}

// ============================================================================
// Signaling Metrics
// ============================================================================

/// Record an envelope accepted by the relay
///
/// Metric: `rq_signals_total`
/// Labels: `kind`
pub fn record_signal(kind: &'static str) {
    counter!("rq_signals_total", "kind" => kind).increment(1);
}

/// Record an envelope dropped because the recipient's mailbox was full
///
/// Metric: `rq_signals_dropped_total`
pub fn record_signal_dropped() {
    counter!("rq_signals_dropped_total").increment(1);
}

/// Set the number of mailboxes currently holding envelopes
///
/// Metric: `rq_signal_mailboxes`
pub fn set_signal_mailboxes(count: usize) {
    gauge!("rq_signal_mailboxes").set(count as f64);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // These tests execute the recording functions against the global no-op
    // recorder. Label normalization is checked directly.

    #[test]
    fn test_normalize_static_endpoints() {
        assert_eq!(normalize_endpoint("/health"), "/health");
        assert_eq!(normalize_endpoint("/api/health"), "/api/health");
        assert_eq!(normalize_endpoint("/api/queue/join"), "/api/queue/join");
        assert_eq!(normalize_endpoint("/api/webrtc/peers"), "/api/webrtc/peers");
    }

    #[test]
    fn test_normalize_dynamic_endpoints() {
        assert_eq!(
            normalize_endpoint("/api/queue/status/6f1c2a"),
            "/api/queue/status/{sessionId}"
        );
        assert_eq!(
            normalize_endpoint("/api/subgroups/delete/Lab%20A"),
            "/api/subgroups/delete/{name}"
        );
        assert_eq!(
            normalize_endpoint("/api/webrtc/signals/abc"),
            "/api/webrtc/signals/{sessionId}"
        );
    }

    #[test]
    fn test_normalize_unknown_endpoints() {
        assert_eq!(normalize_endpoint("/api/queue/status/"), "/other");
        assert_eq!(normalize_endpoint("/api/queue/status/a/b"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(404), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_record_functions_without_recorder() {
        record_http_request("GET", "/health", 200, Duration::from_millis(3));
        record_queue_join("success");
        record_queue_join("QUEUE_FULL");
        record_queue_action("skip");
        record_queue_departures("leave", 1);
        record_reaper_sweep("success", 2);
        record_signal("offer");
        record_signal_dropped();
        set_signal_mailboxes(4);
    }

    #[test]
    fn test_queue_metrics_are_captured() {
        use metrics_util::debugging::DebuggingRecorder;

        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        // Local recorder keeps this test independent of the global one.
        ::metrics::with_local_recorder(&recorder, || {
            record_queue_join("success");
            record_queue_join("success");
            record_queue_action("finish");
            record_signal_dropped();
        });

        let names: Vec<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, _)| key.key().name().to_string())
            .collect();

        assert!(names.iter().any(|n| n == "rq_queue_joins_total"));
        assert!(names.iter().any(|n| n == "rq_queue_actions_total"));
        assert!(names.iter().any(|n| n == "rq_signals_dropped_total"));
    }
}
