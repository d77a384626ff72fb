//! The four limiter scopes.

use crate::error::RateLimitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    Ip,
    Card,
    Locker,
    Device,
}

impl RateLimitScope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Card => "card",
            Self::Locker => "locker",
            Self::Device => "device",
        }
    }

    /// # Errors
    ///
    /// Returns [`RateLimitError::Validation`] if `raw` isn't a known scope.
    pub fn parse(raw: &str) -> Result<Self, RateLimitError> {
        match raw {
            "ip" => Ok(Self::Ip),
            "card" => Ok(Self::Card),
            "locker" => Ok(Self::Locker),
            "device" => Ok(Self::Device),
            other => {
                Err(RateLimitError::Validation { reason: format!("unknown rate limit scope '{other}'") })
            }
        }
    }
}
