//! Error taxonomy for the Event Log.

use lcp_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<EventLogError> for lcp_core::ApiError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::Validation { reason } => Self::Validation(reason),
            EventLogError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}
