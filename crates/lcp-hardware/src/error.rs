//! Error taxonomy for the Hardware Executor.

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    #[error("locker id {0} is invalid")]
    InvalidLocker(i64),

    #[error("hardware executor queue is unavailable")]
    QueueClosed,

    #[error("locker state error: {0}")]
    Locker(#[from] lcp_core::LockerError),
}

impl From<HardwareError> for lcp_core::ApiError {
    fn from(err: HardwareError) -> Self {
        match err {
            HardwareError::InvalidLocker(id) => Self::Validation(format!("invalid locker id {id}")),
            HardwareError::QueueClosed => Self::Hardware("hardware executor unavailable".to_owned()),
            HardwareError::Locker(e) => e.into(),
        }
    }
}
