//! Event log repository — append-only audit trail.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// A persisted event row, mirroring `events` exactly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub kiosk_id: String,
    pub locker_id: Option<i64>,
    pub event_type: String,
    pub rfid_card: Option<String>,
    pub device_id: Option<String>,
    pub staff_user: Option<String>,
    pub details: String,
}

/// A new event to append. `details` must already be sanitized by the caller
/// (`lcp-eventlog`'s writer) — this repository never inspects the payload.
#[derive(Debug, Clone)]
pub struct NewEvent<'a> {
    pub kiosk_id: &'a str,
    pub locker_id: Option<i64>,
    pub event_type: &'a str,
    pub rfid_card: Option<&'a str>,
    pub device_id: Option<&'a str>,
    pub staff_user: Option<&'a str>,
    pub details: &'a serde_json::Value,
}

/// Filters accepted by [`query`].
#[derive(Debug, Clone, Default)]
pub struct EventFilter<'a> {
    pub kiosk_id: Option<&'a str>,
    pub locker_id: Option<i64>,
    pub event_type: Option<&'a str>,
    pub staff_user: Option<&'a str>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

/// Append one event row.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn insert(pool: &SqlitePool, event: NewEvent<'_>) -> Result<i64, StorageError> {
    let result = sqlx::query(
        r"INSERT INTO events
              (timestamp, kiosk_id, locker_id, event_type, rfid_card, device_id, staff_user, details)
          VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(Utc::now())
    .bind(event.kiosk_id)
    .bind(event.locker_id)
    .bind(event.event_type)
    .bind(event.rfid_card)
    .bind(event.device_id)
    .bind(event.staff_user)
    .bind(event.details.to_string())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// Query events with the documented filters, newest first.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn query(pool: &SqlitePool, filter: &EventFilter<'_>) -> Result<Vec<EventRow>, StorageError> {
    // Built with a small query builder rather than sqlx's compile-time macros,
    // since every filter field is optional.
    let mut sql = String::from("SELECT * FROM events WHERE 1 = 1");
    if filter.kiosk_id.is_some() {
        sql.push_str(" AND kiosk_id = ?");
    }
    if filter.locker_id.is_some() {
        sql.push_str(" AND locker_id = ?");
    }
    if filter.event_type.is_some() {
        sql.push_str(" AND event_type = ?");
    }
    if filter.staff_user.is_some() {
        sql.push_str(" AND staff_user = ?");
    }
    if filter.from_date.is_some() {
        sql.push_str(" AND timestamp >= ?");
    }
    if filter.to_date.is_some() {
        sql.push_str(" AND timestamp <= ?");
    }
    sql.push_str(" ORDER BY timestamp DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, EventRow>(&sql);
    if let Some(v) = filter.kiosk_id {
        query = query.bind(v);
    }
    if let Some(v) = filter.locker_id {
        query = query.bind(v);
    }
    if let Some(v) = filter.event_type {
        query = query.bind(v);
    }
    if let Some(v) = filter.staff_user {
        query = query.bind(v);
    }
    if let Some(v) = filter.from_date {
        query = query.bind(v);
    }
    if let Some(v) = filter.to_date {
        query = query.bind(v);
    }
    query = query.bind(filter.limit).bind(filter.offset);

    let rows = query.fetch_all(pool).await?;
    Ok(rows)
}

/// Delete regular events older than `event_cutoff`, excluding staff/audit
/// event types, and staff/audit events older than `audit_cutoff`.
/// `is_audit_type` classifies an `event_type` as staff/audit vs. regular.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn cleanup_old(
    pool: &SqlitePool,
    event_cutoff: DateTime<Utc>,
    audit_cutoff: DateTime<Utc>,
    audit_event_types: &[&str],
) -> Result<u64, StorageError> {
    let placeholders = audit_event_types
        .iter()
        .map(|_| "?")
        .collect::<Vec<_>>()
        .join(", ");

    let regular_sql = format!(
        "DELETE FROM events WHERE timestamp < ? AND event_type NOT IN ({placeholders})"
    );
    let mut q = sqlx::query(&regular_sql).bind(event_cutoff);
    for t in audit_event_types {
        q = q.bind(*t);
    }
    let regular = q.execute(pool).await?.rows_affected();

    let audit_sql = format!(
        "DELETE FROM events WHERE timestamp < ? AND event_type IN ({placeholders})"
    );
    let mut q = sqlx::query(&audit_sql).bind(audit_cutoff);
    for t in audit_event_types {
        q = q.bind(*t);
    }
    let audit = q.execute(pool).await?.rows_affected();

    Ok(regular + audit)
}

/// Rewrite `device_id`, `rfid_card`, and the `ip_address` field inside
/// `details` to deterministic `anon_<hash>` placeholders for rows older than
/// `cutoff`. `hash_fn` computes the placeholder
/// suffix so the hashing scheme lives in `lcp-eventlog`, not here.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn anonymize_older_than(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    hash_fn: impl Fn(&str) -> String,
) -> Result<u64, StorageError> {
    let rows = sqlx::query_as::<_, EventRow>("SELECT * FROM events WHERE timestamp < ?")
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

    let mut touched = 0u64;
    for row in rows {
        let anon_device = row.device_id.as_deref().map(|v| format!("anon_{}", hash_fn(v)));
        let anon_card = row.rfid_card.as_deref().map(|v| format!("anon_{}", hash_fn(v)));

        let mut details: serde_json::Value =
            serde_json::from_str(&row.details).unwrap_or(serde_json::json!({}));
        if let Some(ip) = details.get("ip_address").and_then(|v| v.as_str()) {
            let anon_ip = format!("anon_{}", hash_fn(ip));
            if let Some(obj) = details.as_object_mut() {
                obj.insert("ip_address".to_owned(), serde_json::Value::String(anon_ip));
            }
        }

        if anon_device.is_none() && anon_card.is_none() && row.details == details.to_string() {
            continue;
        }

        sqlx::query(
            "UPDATE events SET device_id = ?, rfid_card = ?, details = ? WHERE id = ?",
        )
        .bind(anon_device.or(row.device_id))
        .bind(anon_card.or(row.rfid_card))
        .bind(details.to_string())
        .bind(row.id)
        .execute(pool)
        .await?;
        touched += 1;
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn insert_and_query_by_kiosk() {
        let pool = pool().await;
        insert(
            &pool,
            NewEvent {
                kiosk_id: "k1",
                locker_id: Some(3),
                event_type: "rfid_assign",
                rfid_card: Some("card-1"),
                device_id: None,
                staff_user: None,
                details: &serde_json::json!({}),
            },
        )
        .await
        .unwrap();

        let results = query(
            &pool,
            &EventFilter {
                kiosk_id: Some("k1"),
                limit: 10,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].event_type, "rfid_assign");
    }
}
