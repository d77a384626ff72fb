//! The event-sink port.
//!
//! The LSM needs to record what happened on every transition, but
//! `lcp-eventlog`'s writer wants to reach back into locker state for
//! context — a genuine cycle. The fix is the same port/adapter shape used
//! for storage and the Modbus transport: `lcp-core` depends only on this
//! trait, and `lcp-eventlog` provides the implementation.

use async_trait::async_trait;

/// One event as the LSM sees it — shaped, but not yet sanitized or persisted.
/// Sanitization (IP hashing, user-agent truncation) and storage are the
/// sink implementation's job, not the caller's.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub kiosk_id: String,
    pub locker_id: Option<i64>,
    pub event_type: &'static str,
    pub rfid_card: Option<String>,
    pub device_id: Option<String>,
    pub staff_user: Option<String>,
    pub details: serde_json::Value,
}

/// Port every component that needs to append to the audit trail writes
/// through. Implementations must not block the caller on a slow sink —
/// failures are logged and swallowed, the same non-fatal treatment given
/// to a failed broadcast send.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn record(&self, event: EventRecord);
}

/// A sink that drops every event — useful in tests that only care about
/// state transitions, not the resulting audit trail.
#[derive(Debug, Default)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn record(&self, _event: EventRecord) {}
}
