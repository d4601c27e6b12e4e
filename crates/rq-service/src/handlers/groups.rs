//! Group registry handlers.
//!
//! - `POST /api/subgroups/create` - Create a group
//! - `DELETE /api/subgroups/delete/:name` - Delete a group and its participants
//! - `GET /api/subgroups/list` - List groups

use crate::errors::RqError;
use crate::models::{
    CreateGroupRequest, CreateGroupResponse, DeleteGroupResponse, GroupListResponse,
};
use crate::routes::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

/// Handler for POST /api/subgroups/create
///
/// # Response
///
/// - 200 OK: Group created
/// - 400 Bad Request: Blank or overlong name
/// - 409 Conflict: Name already taken
#[instrument(skip_all, name = "rq.handlers.create_group")]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<Json<CreateGroupResponse>, RqError> {
    let group = state.groups.create(&request.name).await?;

    Ok(Json(CreateGroupResponse {
        message: format!("Sub-group '{}' created successfully", group.name),
        id: group.id,
        name: group.name,
        created_at: group.created_at,
    }))
}

/// Handler for DELETE /api/subgroups/delete/:name
///
/// # Response
///
/// - 200 OK: Group and its participants removed
/// - 403 Forbidden: Attempt to delete the default group
/// - 404 Not Found: No such group
#[instrument(skip_all, name = "rq.handlers.delete_group", fields(group = %name))]
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteGroupResponse>, RqError> {
    let cleared = state.groups.delete(&name).await?;

    Ok(Json(DeleteGroupResponse {
        success: true,
        message: format!("Sub-group '{}' deleted successfully", name),
        name,
        participants_cleared: cleared,
    }))
}

/// Handler for GET /api/subgroups/list
#[instrument(skip_all, name = "rq.handlers.list_groups")]
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<GroupListResponse>, RqError> {
    let subgroups = state.groups.list().await?;
    Ok(Json(GroupListResponse { subgroups }))
}
