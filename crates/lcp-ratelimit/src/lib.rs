//! The Rate Limiter — token-bucket limiting across four scopes
//! (IP, card, locker, device) with violation tracking and hard blocks.

pub mod error;
pub mod limiter;
pub mod scope;

pub use error::RateLimitError;
pub use limiter::{CheckOutcome, RateLimiter};
pub use scope::RateLimitScope;
