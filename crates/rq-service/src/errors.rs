//! ReadQueue error types.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Queue and
//! relay errors carry a descriptive message for the caller; storage failures
//! are logged server-side and returned as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// ReadQueue error type.
///
/// Maps to HTTP status codes:
/// - NotFound: 404 Not Found
/// - Conflict: 409 Conflict
/// - Forbidden: 403 Forbidden
/// - Full: 409 Conflict
/// - InvalidArgument: 400 Bad Request
/// - Database, Internal: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RqError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Full: {0}")]
    Full(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RqError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RqError::NotFound(_) => 404,
            RqError::Conflict(_) | RqError::Full(_) => 409,
            RqError::Forbidden(_) => 403,
            RqError::InvalidArgument(_) => 400,
            RqError::Database(_) | RqError::Internal(_) => 500,
        }
    }

    /// Stable machine-readable code used in error bodies and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            RqError::NotFound(_) => "NOT_FOUND",
            RqError::Conflict(_) => "CONFLICT",
            RqError::Forbidden(_) => "FORBIDDEN",
            RqError::Full(_) => "QUEUE_FULL",
            RqError::InvalidArgument(_) => "INVALID_ARGUMENT",
            RqError::Database(_) => "DATABASE_ERROR",
            RqError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RqError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = match &self {
            RqError::NotFound(msg)
            | RqError::Conflict(msg)
            | RqError::Forbidden(msg)
            | RqError::Full(msg)
            | RqError::InvalidArgument(msg) => msg.clone(),
            RqError::Database(err) => {
                // Log actual error server-side, return generic message to client
                tracing::error!(target: "rq.database", error = %err, "Database operation failed");
                "An internal database error occurred".to_string()
            }
            RqError::Internal(err) => {
                tracing::error!(target: "rq.internal", error = %err, "Internal error");
                "An internal error occurred".to_string()
            }
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
            },
        };

        (status, Json(error_response)).into_response()
    }
}

/// Convert sqlx errors to RqError
impl From<sqlx::Error> for RqError {
    fn from(err: sqlx::Error) -> Self {
        RqError::Database(err.to_string())
    }
}
