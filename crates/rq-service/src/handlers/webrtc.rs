//! WebRTC signaling handlers.
//!
//! - `POST /api/webrtc/signal` - Leave a handshake message for a peer
//! - `GET /api/webrtc/signals/:session_id` - Drain pending messages
//! - `GET /api/webrtc/peers` - List reachable peers, optionally per group

use crate::errors::RqError;
use crate::models::{
    PeersQuery, PeersResponse, SignalAckResponse, SignalListResponse, SignalRequest,
};
use crate::routes::AppState;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/webrtc/signal
///
/// # Response
///
/// - 200 OK: Envelope buffered for the recipient, whatever its `type`
#[instrument(skip_all, name = "rq.handlers.send_signal")]
pub async fn send_signal(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignalRequest>,
) -> Json<SignalAckResponse> {
    state
        .relay
        .send(
            &request.from_session_id,
            &request.to_session_id,
            &request.kind,
            request.data,
        )
        .await;

    Json(SignalAckResponse {
        success: true,
        message: "Signal stored".to_string(),
    })
}

/// Handler for GET /api/webrtc/signals/:session_id
///
/// Each envelope is returned once; a repeated call sees only newer ones.
#[instrument(skip_all, name = "rq.handlers.drain_signals")]
pub async fn drain_signals(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<SignalListResponse> {
    let signals = state.relay.drain(&session_id).await;
    Json(SignalListResponse { signals })
}

/// Handler for GET /api/webrtc/peers
#[instrument(skip_all, name = "rq.handlers.list_peers")]
pub async fn list_peers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PeersQuery>,
) -> Result<Json<PeersResponse>, RqError> {
    let sub_group = query
        .sub_group
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty());
    let peers = state.queue.peers(sub_group.as_deref()).await?;

    Ok(Json(PeersResponse { peers, sub_group }))
}
