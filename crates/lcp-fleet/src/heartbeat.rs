//! Kiosk heartbeat tracking — records `last_seen`/`zone`/`version`
//! on every beat and sweeps for kiosks that have gone quiet.

use chrono::Utc;
use lcp_core::event_sink::{EventRecord, EventSink};
use lcp_storage::heartbeats::{self, HeartbeatRow};
use lcp_storage::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::FleetError;

pub use lcp_storage::heartbeats::HeartbeatRow as Heartbeat;

/// Tracks kiosk liveness over `lcp_storage::heartbeats`, emitting
/// `kiosk_online`/`kiosk_offline` events on status transitions.
pub struct HeartbeatTracker {
    pool: SqlitePool,
    sink: Arc<dyn EventSink>,
    offline_threshold_seconds: u64,
}

impl HeartbeatTracker {
    #[must_use]
    pub fn new(pool: SqlitePool, sink: Arc<dyn EventSink>, offline_threshold_seconds: u64) -> Self {
        Self { pool, sink, offline_threshold_seconds }
    }

    /// `record_heartbeat`. Flips a previously-offline kiosk back online
    /// and emits `kiosk_online`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Storage`] on a database failure.
    pub async fn record_heartbeat(
        &self,
        kiosk_id: &str,
        zone: Option<&str>,
        version: Option<&str>,
    ) -> Result<(), FleetError> {
        let was_offline =
            heartbeats::get(&self.pool, kiosk_id).await?.is_some_and(|row| row.status == "offline");

        heartbeats::upsert(&self.pool, kiosk_id, zone, "online", version).await?;

        if was_offline {
            info!(kiosk_id, "kiosk back online");
            self.sink
                .record(EventRecord {
                    kiosk_id: kiosk_id.to_owned(),
                    locker_id: None,
                    event_type: "kiosk_online",
                    rfid_card: None,
                    device_id: None,
                    staff_user: None,
                    details: serde_json::json!({}),
                })
                .await;
        }
        Ok(())
    }

    /// `update_telemetry`, merging the latest snapshot into the
    /// heartbeat row without disturbing `last_seen`.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Storage`] on a database failure.
    pub async fn update_telemetry(
        &self,
        kiosk_id: &str,
        telemetry: &serde_json::Value,
    ) -> Result<(), FleetError> {
        heartbeats::update_telemetry(&self.pool, kiosk_id, telemetry).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`FleetError::Storage`] on a database failure.
    pub async fn get(&self, kiosk_id: &str) -> Result<Option<HeartbeatRow>, FleetError> {
        Ok(heartbeats::get(&self.pool, kiosk_id).await?)
    }

    /// # Errors
    ///
    /// Returns [`FleetError::Storage`] on a database failure.
    pub async fn list(&self) -> Result<Vec<HeartbeatRow>, FleetError> {
        Ok(heartbeats::list(&self.pool).await?)
    }

    /// Offline-detection sweep: marks every kiosk whose `last_seen`
    /// exceeds `offline_threshold_seconds` as offline and emits
    /// `kiosk_offline` for each. Returns the kiosk ids flipped.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Storage`] on a database failure.
    pub async fn sweep_offline(&self) -> Result<Vec<String>, FleetError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(i64::try_from(self.offline_threshold_seconds).unwrap_or(30));
        let stale = heartbeats::find_stale(&self.pool, cutoff).await?;

        let mut flipped = Vec::with_capacity(stale.len());
        for kiosk in stale {
            match heartbeats::set_status(&self.pool, &kiosk.kiosk_id, "offline").await {
                Ok(true) => {
                    warn!(kiosk_id = kiosk.kiosk_id, "kiosk marked offline");
                    self.sink
                        .record(EventRecord {
                            kiosk_id: kiosk.kiosk_id.clone(),
                            locker_id: None,
                            event_type: "kiosk_offline",
                            rfid_card: None,
                            device_id: None,
                            staff_user: None,
                            details: serde_json::json!({}),
                        })
                        .await;
                    flipped.push(kiosk.kiosk_id);
                }
                Ok(false) => {}
                Err(err) => warn!(kiosk_id = kiosk.kiosk_id, %err, "failed to mark kiosk offline"),
            }
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use lcp_core::event_sink::NullEventSink;
    use lcp_storage::run_migrations;

    use super::*;

    async fn tracker() -> HeartbeatTracker {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        HeartbeatTracker::new(pool, Arc::new(NullEventSink), 30)
    }

    #[tokio::test]
    async fn record_then_sweep_offline() {
        let hb = tracker().await;
        hb.record_heartbeat("k1", Some("zone-a"), Some("1.0.0")).await.unwrap();
        assert!(hb.sweep_offline().await.unwrap().is_empty());

        // Back-date last_seen past the threshold directly.
        sqlx::query("UPDATE kiosk_heartbeat SET last_seen = ? WHERE kiosk_id = 'k1'")
            .bind(Utc::now() - chrono::Duration::seconds(60))
            .execute(&hb.pool)
            .await
            .unwrap();

        let flipped = hb.sweep_offline().await.unwrap();
        assert_eq!(flipped, vec!["k1".to_owned()]);
        assert_eq!(hb.get("k1").await.unwrap().unwrap().status, "offline");
    }

    #[tokio::test]
    async fn heartbeat_after_offline_goes_back_online() {
        let hb = tracker().await;
        hb.record_heartbeat("k1", None, None).await.unwrap();
        heartbeats::set_status(&hb.pool, "k1", "offline").await.unwrap();
        hb.record_heartbeat("k1", None, None).await.unwrap();
        assert_eq!(hb.get("k1").await.unwrap().unwrap().status, "online");
    }
}
