//! The state-broadcaster port.
//!
//! Every LSM mutation must synchronously enqueue a `state_update` message
//! before returning success, and `lcp-core` must not depend on `lcp-fleet`
//! (the broadcast bus lives downstream of the LSM in the dependency order).
//! Same port/adapter shape as [`crate::event_sink::EventSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{LockerStatus, OwnerType};

/// A locker state change, shaped exactly as the `state_update` wire message.
#[derive(Debug, Clone)]
pub struct StateUpdate {
    pub kiosk_id: String,
    pub locker_id: i64,
    pub state: LockerStatus,
    pub owner_key: Option<String>,
    pub owner_type: Option<OwnerType>,
    pub display_name: Option<String>,
    pub is_vip: bool,
    pub last_changed: DateTime<Utc>,
}

/// Port the LSM publishes `state_update` messages through. `lcp-fleet`'s
/// broadcast bus implements this.
#[async_trait]
pub trait StateBroadcaster: Send + Sync {
    async fn broadcast_state_update(&self, update: StateUpdate);
}

/// A broadcaster that drops every update — used in tests that only assert on
/// storage state.
#[derive(Debug, Default)]
pub struct NullBroadcaster;

#[async_trait]
impl StateBroadcaster for NullBroadcaster {
    async fn broadcast_state_update(&self, _update: StateUpdate) {}
}
