//! Turn queue handlers.
//!
//! - `POST /api/queue/join` - Join a group's queue
//! - `GET /api/queue/status/:session_id` - Poll position
//! - `POST /api/queue/action` - start, skip, or finish
//! - `DELETE /api/queue/leave/:session_id` - Leave the queue
//! - `GET /api/queue/all` - List every participant
//! - `DELETE /api/queue/clear/:group_name` - Clear one group's queue
//!
//! Session ids are the bearer of identity here; there is no authentication.

use crate::errors::RqError;
use crate::models::{
    ClearQueueResponse, JoinQueueRequest, JoinQueueResponse, MessageResponse, QueueAction,
    QueueActionRequest, QueueListResponse, QueueStatusResponse,
};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/queue/join
///
/// # Response
///
/// - 200 OK: Session id and initial position
/// - 400 Bad Request: Blank or overlong name
/// - 409 Conflict: Group is full (`QUEUE_FULL`)
#[instrument(skip_all, name = "rq.handlers.join_queue")]
pub async fn join_queue(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JoinQueueRequest>,
) -> Result<Json<JoinQueueResponse>, RqError> {
    let outcome = state.queue.join(&request.name, &request.sub_group).await?;
    let entry = outcome.entry;

    Ok(Json(JoinQueueResponse {
        session_id: entry.session_id,
        position: outcome.position,
        message: format!(
            "Welcome {}! You are at position {} in {}",
            entry.name, outcome.position, entry.group_name
        ),
        sub_group: entry.group_name,
    }))
}

/// Handler for GET /api/queue/status/:session_id
///
/// Polling also counts as activity for the participant.
#[instrument(skip_all, name = "rq.handlers.queue_status")]
pub async fn queue_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<QueueStatusResponse>, RqError> {
    let status = state.queue.status(&session_id).await?;
    Ok(Json(status))
}

/// Handler for POST /api/queue/action
///
/// # Response
///
/// - 200 OK: Action applied
/// - 400 Bad Request: Unknown action
/// - 404 Not Found: Unknown session
#[instrument(skip_all, name = "rq.handlers.queue_action")]
pub async fn queue_action(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueueActionRequest>,
) -> Result<Json<MessageResponse>, RqError> {
    let (action, entry) = state
        .queue
        .act(&request.session_id, &request.action)
        .await?;

    let message = match action {
        QueueAction::Start => "You've started reading. Good luck!".to_string(),
        QueueAction::Skip | QueueAction::Finish => format!(
            "Action '{}' processed. You've been moved to the end of the queue in {}.",
            action, entry.group_name
        ),
    };

    Ok(Json(MessageResponse { message }))
}

/// Handler for DELETE /api/queue/leave/:session_id
#[instrument(skip_all, name = "rq.handlers.leave_queue")]
pub async fn leave_queue(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<MessageResponse>, RqError> {
    state.queue.leave(&session_id).await?;

    Ok(Json(MessageResponse {
        message: "You have left the queue".to_string(),
    }))
}

/// Handler for GET /api/queue/all
#[instrument(skip_all, name = "rq.handlers.list_queue")]
pub async fn list_queue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QueueListResponse>, RqError> {
    let queue = state.queue.list_all().await?;
    let total = queue.len();
    Ok(Json(QueueListResponse { queue, total }))
}

/// Handler for DELETE /api/queue/clear/:group_name
///
/// Removes the participants only; the group itself stays registered.
#[instrument(skip_all, name = "rq.handlers.clear_queue", fields(group = %group_name))]
pub async fn clear_queue(
    State(state): State<Arc<AppState>>,
    Path(group_name): Path<String>,
) -> Result<Json<ClearQueueResponse>, RqError> {
    let count = state.queue.clear_group(&group_name).await?;

    Ok(Json(ClearQueueResponse {
        message: format!("Cleared {} participants from {}", count, group_name),
        count,
    }))
}
