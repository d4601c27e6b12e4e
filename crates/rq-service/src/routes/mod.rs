//! HTTP routes for the ReadQueue service.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::http_metrics_middleware;
use crate::policy::QueuePolicy;
use crate::repositories::QueueStore;
use crate::services::{GroupService, QueueService, SignalRelay};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Backing store, used directly only for health pings.
    pub store: Arc<dyn QueueStore>,

    /// Group registry.
    pub groups: GroupService,

    /// Turn queue.
    pub queue: QueueService,

    /// Signaling mailboxes. Never persisted.
    pub relay: Arc<SignalRelay>,
}

impl AppState {
    /// Wire the services over `store` using the limits from `config`.
    pub fn new(config: Config, store: Arc<dyn QueueStore>) -> Self {
        let policy = QueuePolicy::new(config.max_participants_per_group);
        let relay = Arc::new(SignalRelay::new(config.signal_mailbox_capacity));

        Self {
            groups: GroupService::new(store.clone()),
            queue: QueueService::new(store.clone(), policy),
            relay,
            store,
            config,
        }
    }
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health` and `/api/health` - Liveness plus store ping
/// - `/metrics` - Prometheus metrics endpoint
/// - `/api/subgroups/*` - Group registry
/// - `/api/queue/*` - Turn queue
/// - `/api/webrtc/*` - Signaling relay
/// - TraceLayer for request logging
/// - Permissive CORS, since browser clients are served from other origins
/// - HTTP metrics middleware
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/health", get(handlers::health_check))
        // Group registry
        .route("/api/subgroups/create", post(handlers::create_group))
        .route("/api/subgroups/delete/:name", delete(handlers::delete_group))
        .route("/api/subgroups/list", get(handlers::list_groups))
        // Turn queue
        .route("/api/queue/join", post(handlers::join_queue))
        .route("/api/queue/status/:session_id", get(handlers::queue_status))
        .route("/api/queue/action", post(handlers::queue_action))
        .route("/api/queue/leave/:session_id", delete(handlers::leave_queue))
        .route("/api/queue/all", get(handlers::list_queue))
        .route("/api/queue/clear/:group_name", delete(handlers::clear_queue))
        // Signaling relay
        .route("/api/webrtc/signal", post(handlers::send_signal))
        .route("/api/webrtc/signals/:session_id", get(handlers::drain_signals))
        .route("/api/webrtc/peers", get(handlers::list_peers))
        .with_state(state);

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Layer order (bottom-to-top execution):
    // 1. TimeoutLayer - Timeout the request (innermost)
    // 2. TraceLayer - Log request details
    // 3. CorsLayer - Answer preflights and tag responses
    // 4. http_metrics_middleware - Record ALL responses (outermost)
    api_routes
        .merge(metrics_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(http_metrics_middleware))
}
