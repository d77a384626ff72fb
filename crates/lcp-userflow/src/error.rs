//! Error taxonomy for user-flow orchestration.

#[derive(Debug, thiserror::Error)]
pub enum UserFlowError {
    #[error("validation failed: {reason}")]
    Validation { reason: String },

    #[error("locker error: {0}")]
    Locker(#[from] lcp_core::LockerError),

    #[error("hardware error: {0}")]
    Hardware(#[from] lcp_hardware::HardwareError),
}

impl From<UserFlowError> for lcp_core::ApiError {
    fn from(err: UserFlowError) -> Self {
        match err {
            UserFlowError::Validation { reason } => Self::Validation(reason),
            UserFlowError::Locker(e) => e.into(),
            UserFlowError::Hardware(e) => e.into(),
        }
    }
}
