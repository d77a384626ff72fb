//! The append-only event writer — implements `lcp_core::EventSink`
//! so the LSM (and other subsystems) can record events without depending on
//! this crate, and exposes a typed API per event family for direct callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lcp_core::event_sink::{EventRecord, EventSink};
use lcp_storage::events::{self, EventFilter, EventRow};
use lcp_storage::SqlitePool;
use tracing::{info, warn};

use crate::error::EventLogError;
use crate::sanitize::FieldHasher;

/// Event types treated as staff/audit actions for retention purposes:
/// these survive `audit_retention_days` instead of the shorter
/// `event_retention_days` regular events get.
pub const AUDIT_EVENT_TYPES: &[&str] = &[
    "staff_block",
    "staff_unblock",
    "locker_recovered",
    "force_transition",
    "rate_limit_reset",
    "rate_limit_violation",
];

/// A single queried event, with `details` decoded back into JSON.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub kiosk_id: String,
    pub locker_id: Option<i64>,
    pub event_type: String,
    pub rfid_card: Option<String>,
    pub device_id: Option<String>,
    pub staff_user: Option<String>,
    pub details: serde_json::Value,
}

impl Event {
    fn from_row(row: EventRow) -> Self {
        let details = serde_json::from_str(&row.details).unwrap_or(serde_json::json!({}));
        Self {
            id: row.id,
            timestamp: row.timestamp,
            kiosk_id: row.kiosk_id,
            locker_id: row.locker_id,
            event_type: row.event_type,
            rfid_card: row.rfid_card,
            device_id: row.device_id,
            staff_user: row.staff_user,
            details,
        }
    }
}

/// The append-only writer. Sanitizes `details` before every insert
/// and provides typed helpers per event family over the generic
/// `EventSink::record` path.
pub struct EventLog {
    pool: SqlitePool,
    hasher: FieldHasher,
    event_retention_days: u32,
    audit_retention_days: u32,
}

impl EventLog {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        hasher: FieldHasher,
        event_retention_days: u32,
        audit_retention_days: u32,
    ) -> Self {
        Self { pool, hasher, event_retention_days, audit_retention_days }
    }

    /// Typed query over `{kiosk_id, locker_id, event_type, staff_user,
    /// from_date, to_date, limit, offset}`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] on a database failure.
    pub async fn query(&self, filter: &EventFilter<'_>) -> Result<Vec<Event>, EventLogError> {
        let rows = events::query(&self.pool, filter).await?;
        Ok(rows.into_iter().map(Event::from_row).collect())
    }

    /// Retention sweep: regular events older than `event_retention_days`,
    /// staff/audit events older than `audit_retention_days`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] on a database failure.
    pub async fn cleanup_old(&self) -> Result<u64, EventLogError> {
        let now = Utc::now();
        let event_cutoff = now - chrono::Duration::days(i64::from(self.event_retention_days));
        let audit_cutoff = now - chrono::Duration::days(i64::from(self.audit_retention_days));
        let deleted = events::cleanup_old(&self.pool, event_cutoff, audit_cutoff, AUDIT_EVENT_TYPES).await?;
        if deleted > 0 {
            info!(deleted, "stale events purged");
        }
        Ok(deleted)
    }

    /// Anonymization pass: rewrites `device_id`, `rfid_card`, and the
    /// `ip_address` field of `details` to `anon_<hash>` for rows older than
    /// `older_than_days`.
    ///
    /// # Errors
    ///
    /// Returns [`EventLogError::Storage`] on a database failure.
    pub async fn anonymize_older_than(&self, older_than_days: u32) -> Result<u64, EventLogError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        let hasher = self.hasher.clone();
        let touched = events::anonymize_older_than(&self.pool, cutoff, move |v| hasher.anonymized(v)).await?;
        if touched > 0 {
            info!(touched, "events anonymized");
        }
        Ok(touched)
    }
}

#[async_trait]
impl EventSink for EventLog {
    /// Sanitizes `details` (IP hash, user-agent truncation) and appends one
    /// row. Failures are logged and swallowed — a slow or unavailable event
    /// log must never block a locker state mutation.
    async fn record(&self, event: EventRecord) {
        let mut details = event.details;
        crate::sanitize::sanitize_details(&mut details, &self.hasher);

        let result = events::insert(
            &self.pool,
            events::NewEvent {
                kiosk_id: &event.kiosk_id,
                locker_id: event.locker_id,
                event_type: event.event_type,
                rfid_card: event.rfid_card.as_deref(),
                device_id: event.device_id.as_deref(),
                staff_user: event.staff_user.as_deref(),
                details: &details,
            },
        )
        .await;

        if let Err(err) = result {
            warn!(event_type = event.event_type, kiosk_id = event.kiosk_id, %err, "failed to persist event");
        }
    }
}

#[cfg(test)]
mod tests {
    use lcp_storage::run_migrations;

    use super::*;

    async fn log() -> EventLog {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        EventLog::new(pool, FieldHasher::new(b"test-key".to_vec()), 30, 90)
    }

    #[tokio::test]
    async fn record_sanitizes_ip_before_persisting() {
        let log = log().await;
        log.record(EventRecord {
            kiosk_id: "k1".into(),
            locker_id: Some(3),
            event_type: "qr_assign",
            rfid_card: None,
            device_id: Some("device-abc".into()),
            staff_user: None,
            details: serde_json::json!({ "ip_address": "10.0.0.5" }),
        })
        .await;

        let rows = log.query(&EventFilter { kiosk_id: Some("k1"), limit: 10, ..Default::default() }).await.unwrap();
        assert_eq!(rows.len(), 1);
        let ip = rows[0].details["ip_address"].as_str().unwrap();
        assert!(ip.starts_with("hash_"));
        assert_ne!(ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn cleanup_old_is_a_no_op_on_fresh_events() {
        let log = log().await;
        log.record(EventRecord {
            kiosk_id: "k1".into(),
            locker_id: None,
            event_type: "rfid_assign",
            rfid_card: Some("card-1".into()),
            device_id: None,
            staff_user: None,
            details: serde_json::json!({}),
        })
        .await;
        assert_eq!(log.cleanup_old().await.unwrap(), 0);
    }
}
