//! The real-time broadcast bus — a single-process publisher fanning
//! out structured messages to every connected subscriber over a
//! `tokio::sync::broadcast` channel, implementing `lcp_core::StateBroadcaster`
//! so the LSM can publish without depending on this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcp_core::broadcast::{StateBroadcaster, StateUpdate};
use serde::Serialize;
use tokio::sync::broadcast;

/// The five outbound message shapes, each wrapped in the documented
/// `{type, timestamp, data}` envelope via `BusMessage::envelope`.
#[derive(Debug, Clone)]
pub enum BusMessage {
    StateUpdate {
        kiosk_id: String,
        locker_id: i64,
        state: String,
        owner_key: Option<String>,
        owner_type: Option<String>,
        display_name: Option<String>,
        is_vip: bool,
        last_changed: DateTime<Utc>,
    },
    SessionUpdate {
        session_id: String,
        kiosk_id: String,
        status: String,
        selected_locker: Option<i64>,
        reason: Option<String>,
    },
    ConnectionStatus {
        status: String,
        connected_clients: usize,
        last_update: DateTime<Utc>,
    },
    Error {
        error: String,
        details: serde_json::Value,
    },
    Heartbeat,
}

/// The real `{type, timestamp, data}` envelope subscribers receive.
/// `BusMessage::envelope` builds one of these per publish, nesting each
/// variant's fields under `data` rather than inlining them next to `type`.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl BusMessage {
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        let (kind, data) = match self {
            Self::StateUpdate {
                kiosk_id,
                locker_id,
                state,
                owner_key,
                owner_type,
                display_name,
                is_vip,
                last_changed,
            } => (
                "state_update",
                serde_json::json!({
                    "kiosk_id": kiosk_id,
                    "locker_id": locker_id,
                    "state": state,
                    "owner_key": owner_key,
                    "owner_type": owner_type,
                    "display_name": display_name,
                    "is_vip": is_vip,
                    "last_changed": last_changed,
                }),
            ),
            Self::SessionUpdate { session_id, kiosk_id, status, selected_locker, reason } => (
                "session_update",
                serde_json::json!({
                    "session_id": session_id,
                    "kiosk_id": kiosk_id,
                    "status": status,
                    "selected_locker": selected_locker,
                    "reason": reason,
                }),
            ),
            Self::ConnectionStatus { status, connected_clients, last_update } => (
                "connection_status",
                serde_json::json!({
                    "status": status,
                    "connected_clients": connected_clients,
                    "last_update": last_update,
                }),
            ),
            Self::Error { error, details } => {
                ("error", serde_json::json!({ "error": error, "details": details }))
            }
            Self::Heartbeat => ("heartbeat", serde_json::json!({})),
        };
        Envelope { kind, timestamp: Utc::now(), data }
    }
}

/// The broadcast bus. Cloning shares the same underlying channel and
/// subscriber counter — every clone publishes to and counts the same set of
/// connections.
#[derive(Clone)]
pub struct BroadcastBus {
    tx: broadcast::Sender<Envelope>,
    subscriber_count: Arc<AtomicUsize>,
}

/// A live subscription. Dropping it decrements the bus's connected-client
/// count, mirroring a closed websocket connection leaving the subscriber set.
pub struct Subscription {
    rx: broadcast::Receiver<Envelope>,
    subscriber_count: Arc<AtomicUsize>,
}

impl Subscription {
    /// Await the next published message. Returns `None` once the publisher
    /// has lagged this subscriber out of the channel's ring buffer — the
    /// caller should treat that as a dropped connection.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await.ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscriber_count.fetch_sub(1, Ordering::Relaxed);
    }
}

impl BroadcastBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx, subscriber_count: Arc::new(AtomicUsize::new(0)) }
    }

    /// Register a new subscriber, incrementing the connected-client count.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.subscriber_count.fetch_add(1, Ordering::Relaxed);
        Subscription { rx: self.tx.subscribe(), subscriber_count: self.subscriber_count.clone() }
    }

    #[must_use]
    pub fn connected_clients(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }

    /// Fan out `message`. A lagging or disconnected subscriber is simply
    /// absent from future receives — `tokio::sync::broadcast::Sender::send`
    /// already isolates per-subscriber failures from the publish call, giving
    /// the same per-subscriber isolation without needing to iterate a
    /// connection list by hand.
    pub fn publish(&self, message: &BusMessage) {
        // No receivers is not an error: publishing with zero subscribers is
        // the common case between broadcast-client connections.
        let _ = self.tx.send(message.envelope());
    }

    pub fn publish_connection_status(&self) {
        self.publish(&BusMessage::ConnectionStatus {
            status: "ok".to_owned(),
            connected_clients: self.connected_clients(),
            last_update: Utc::now(),
        });
    }
}

#[async_trait]
impl StateBroadcaster for BroadcastBus {
    async fn broadcast_state_update(&self, update: StateUpdate) {
        self.publish(&BusMessage::StateUpdate {
            kiosk_id: update.kiosk_id,
            locker_id: update.locker_id,
            state: update.state.as_str().to_owned(),
            owner_key: update.owner_key,
            owner_type: update.owner_type.map(|t| t.as_str().to_owned()),
            display_name: update.display_name,
            is_vip: update.is_vip,
            last_changed: update.last_changed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_count_tracks_subscribe_and_drop() {
        let bus = BroadcastBus::new(16);
        assert_eq!(bus.connected_clients(), 0);
        let sub = bus.subscribe();
        assert_eq!(bus.connected_clients(), 1);
        drop(sub);
        assert_eq!(bus.connected_clients(), 0);
    }

    #[tokio::test]
    async fn published_state_update_reaches_subscriber() {
        let bus = BroadcastBus::new(16);
        let mut sub = bus.subscribe();
        bus.broadcast_state_update(StateUpdate {
            kiosk_id: "k1".into(),
            locker_id: 1,
            state: lcp_core::LockerStatus::Free,
            owner_key: None,
            owner_type: None,
            display_name: None,
            is_vip: false,
            last_changed: Utc::now(),
        })
        .await;
        let envelope = sub.recv().await.unwrap();
        assert_eq!(envelope.kind, "state_update");
        assert_eq!(envelope.data["kiosk_id"], "k1");
    }
}
