//! The Command Queue — durable, at-least-once per-kiosk command
//! delivery with exponential backoff, built over `lcp-storage::commands`.

pub mod error;
pub mod payload;
pub mod queue;

pub use error::QueueError;
pub use payload::{CommandPayload, CommandType};
pub use queue::{Command, CommandQueue, QueueSettings};
