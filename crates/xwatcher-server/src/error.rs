//! API error types for the xwatcher server.
//!
//! Maps core domain errors to HTTP status codes. Every failure body is the
//! envelope `{"detail": <message>}`; internal errors are logged in full and
//! surfaced with an opaque message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use xwatcher_core::error::{AuthError, SchedulerError, StorageError, TaskError};

/// API error type for route handlers.
pub enum ApiError {
    /// Internal storage/database error.
    Storage(StorageError),
    /// Requested resource not found.
    NotFound(String),
    /// Malformed input (shape, parse failures).
    BadRequest(String),
    /// State-machine conflict (duplicate email, delete running task).
    Conflict(String),
    /// Semantically invalid input (ranges, timestamps).
    Unprocessable(String),
    /// Missing or invalid credentials.
    Unauthorized(String),
    /// Authenticated but not permitted.
    Forbidden(String),
    /// Unexpected internal failure.
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound { .. } => Self::NotFound(err.to_string()),
            TaskError::Conflict { .. } => Self::Conflict(err.to_string()),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::IntervalOutOfRange { .. } | SchedulerError::InvalidNextRun { .. } => {
                Self::Unprocessable(err.to_string())
            }
            SchedulerError::Storage(e) => Self::Storage(e),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken | AuthError::InvalidCredentials => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::Storage(e) => Self::Storage(e),
            AuthError::Hash { .. } => {
                tracing::error!("hash error: {err}");
                Self::Internal("internal error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Storage(e) => {
                tracing::error!("storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Self::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = axum::Json(json!({ "detail": message }));
        (status, body).into_response()
    }
}
