//! Error taxonomy for the locker control plane.
//!
//! Each subsystem defines its own narrow error enum. [`ApiError`] is the
//! boundary type every subsystem error converges into — a fixed set of
//! seven kinds that every HTTP-facing `AppError` maps one-to-one from.

use lcp_storage::StorageError;

/// Errors from the Locker State Manager.
#[derive(Debug, thiserror::Error)]
pub enum LockerError {
    /// Malformed input — never retried.
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// The referenced locker doesn't exist.
    #[error("locker {kiosk_id}/{id} not found")]
    NotFound { kiosk_id: String, id: i64 },

    /// The requested transition isn't legal from the locker's current state.
    #[error("invalid transition: {reason}")]
    InvalidTransition { reason: String },

    /// The database is unreachable or returned an unexpected error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The seven presentation-level error kinds every subsystem converges on.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("version conflict, retry the read-modify-write")]
    VersionConflict,

    #[error("rate limited ({reason}), retry after {retry_after_secs}s")]
    RateLimited { reason: String, retry_after_secs: u64 },

    #[error("hardware error: {0}")]
    Hardware(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<LockerError> for ApiError {
    fn from(err: LockerError) -> Self {
        match err {
            LockerError::Validation { reason } => Self::Validation(reason),
            LockerError::NotFound { kiosk_id, id } => Self::NotFound(format!("locker {kiosk_id}/{id}")),
            LockerError::InvalidTransition { reason } => Self::InvalidTransition(reason),
            LockerError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}
