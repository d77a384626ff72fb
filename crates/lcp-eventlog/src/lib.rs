//! The Event Log — sanitizing, typed append-only audit writer.
//! Implements `lcp_core::EventSink` so the LSM can record transitions
//! without this crate's existence creating a dependency cycle.

pub mod error;
pub mod sanitize;
pub mod writer;

pub use error::EventLogError;
pub use sanitize::FieldHasher;
pub use writer::{Event, EventLog, AUDIT_EVENT_TYPES};
