//! RFID and QR user-flow orchestration, composing the rate limiter,
//! LSM, Hardware Executor, and fleet sessions. Outcomes carry a stable
//! message *key* plus structured params — rendering them into an
//! operator-facing sentence is an external i18n layer's job, not this
//! crate's.

pub mod error;
pub mod message_keys;
pub mod qr;
pub mod rfid;

pub use error::UserFlowError;
pub use qr::{QrFlow, QrOutcome};
pub use rfid::{RfidFlow, RfidOutcome};
