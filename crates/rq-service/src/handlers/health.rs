//! Health check handler.

use crate::models::HealthResponse;
use crate::routes::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = "readqueue";

/// Handler for GET /health and GET /api/health
///
/// Pings the backing store and reports the result. Always answers 200 so a
/// load balancer can read the body; `status` carries the verdict.
///
/// ```json
/// { "status": "healthy", "service": "readqueue", "store": "healthy" }
/// ```
#[instrument(skip_all, name = "rq.health.check")]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let verdict = match state.store.ping().await {
        Ok(()) => "healthy",
        Err(e) => {
            warn!(target: "rq.handlers.health", error = %e, "Store ping failed");
            "unhealthy"
        }
    };

    Json(HealthResponse {
        status: verdict.to_string(),
        service: SERVICE_NAME.to_string(),
        store: verdict.to_string(),
    })
}
