//! Error taxonomy for fleet services.

use lcp_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("kiosk {0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<FleetError> for lcp_core::ApiError {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::Validation { reason } => Self::Validation(reason),
            FleetError::NotFound(id) => Self::NotFound(format!("kiosk {id}")),
            FleetError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}
