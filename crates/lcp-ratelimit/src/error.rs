//! Error taxonomy for the Rate Limiter.

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },
}

impl From<RateLimitError> for lcp_core::ApiError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Validation { reason } => Self::Validation(reason),
        }
    }
}
