//! Prometheus metrics endpoint handler.
//!
//! Unauthenticated. Labels carry no group names or session ids.

use axum::{extract::State, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;

/// Handler for GET /metrics
///
/// Returns the Prometheus text exposition format:
/// ```text
/// # TYPE rq_queue_joins_total counter
/// rq_queue_joins_total{status="success"} 42
/// ```
#[tracing::instrument(skip_all, name = "rq.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
