//! Error taxonomy for the Command Queue.

use lcp_storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("command {0} not found")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<QueueError> for lcp_core::ApiError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::Validation { reason } => Self::Validation(reason),
            QueueError::NotFound(id) => Self::NotFound(format!("command {id}")),
            QueueError::Storage(e) => Self::Storage(e.to_string()),
        }
    }
}
