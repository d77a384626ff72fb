//! HTTP error types for the locker control plane server.
//!
//! Maps the seven-kind [`lcp_core::ApiError`] taxonomy into HTTP
//! responses. Every error variant produces a JSON body with a
//! machine-readable `error` field and a human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lcp_core::ApiError;
use serde::Serialize;

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    InvalidTransition(String),
    VersionConflict,
    RateLimited { reason: String, retry_after_secs: u64 },
    Hardware(String),
    Storage(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, "validation", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::InvalidTransition(msg) => (StatusCode::CONFLICT, "invalid_transition", msg),
            Self::VersionConflict => (
                StatusCode::CONFLICT,
                "version_conflict",
                "version conflict, retry the read-modify-write".to_owned(),
            ),
            Self::RateLimited { reason, retry_after_secs } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                format!("{reason} (retry after {retry_after_secs}s)"),
            ),
            Self::Hardware(msg) => (StatusCode::BAD_GATEWAY, "hardware_error", msg),
            Self::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error", msg),
        };

        let body = ErrorBody { error: error_type, message };
        (status, axum::Json(body)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Validation(msg) => Self::Validation(msg),
            ApiError::NotFound(msg) => Self::NotFound(msg),
            ApiError::InvalidTransition(msg) => Self::InvalidTransition(msg),
            ApiError::VersionConflict => Self::VersionConflict,
            ApiError::RateLimited { reason, retry_after_secs } => {
                Self::RateLimited { reason, retry_after_secs }
            }
            ApiError::Hardware(msg) => Self::Hardware(msg),
            ApiError::Storage(msg) => Self::Storage(msg),
        }
    }
}

impl From<lcp_userflow::UserFlowError> for AppError {
    fn from(err: lcp_userflow::UserFlowError) -> Self {
        ApiError::from(err).into()
    }
}

impl From<lcp_queue::QueueError> for AppError {
    fn from(err: lcp_queue::QueueError) -> Self {
        ApiError::from(err).into()
    }
}
