//! Kiosk heartbeat repository.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// A persisted heartbeat row, mirroring `kiosk_heartbeat` exactly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct HeartbeatRow {
    pub kiosk_id: String,
    pub last_seen: DateTime<Utc>,
    pub zone: Option<String>,
    pub status: String,
    pub version: Option<String>,
    pub telemetry_data: Option<String>,
    pub last_telemetry_update: Option<DateTime<Utc>>,
}

/// Record a heartbeat, creating the row on first contact.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn upsert(
    pool: &SqlitePool,
    kiosk_id: &str,
    zone: Option<&str>,
    status: &str,
    version: Option<&str>,
) -> Result<(), StorageError> {
    sqlx::query(
        r"INSERT INTO kiosk_heartbeat (kiosk_id, last_seen, zone, status, version)
          VALUES (?, ?, ?, ?, ?)
          ON CONFLICT (kiosk_id) DO UPDATE SET
              last_seen = excluded.last_seen,
              zone = excluded.zone,
              status = excluded.status,
              version = excluded.version",
    )
    .bind(kiosk_id)
    .bind(Utc::now())
    .bind(zone)
    .bind(status)
    .bind(version)
    .execute(pool)
    .await?;
    Ok(())
}

/// Merge in the latest telemetry snapshot for a kiosk without disturbing its
/// heartbeat timestamp.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn update_telemetry(
    pool: &SqlitePool,
    kiosk_id: &str,
    telemetry_data: &serde_json::Value,
) -> Result<(), StorageError> {
    sqlx::query(
        r"UPDATE kiosk_heartbeat
          SET telemetry_data = ?, last_telemetry_update = ?
          WHERE kiosk_id = ?",
    )
    .bind(telemetry_data.to_string())
    .bind(Utc::now())
    .bind(kiosk_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a single kiosk's heartbeat row.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn get(pool: &SqlitePool, kiosk_id: &str) -> Result<Option<HeartbeatRow>, StorageError> {
    let row = sqlx::query_as::<_, HeartbeatRow>(
        "SELECT * FROM kiosk_heartbeat WHERE kiosk_id = ?",
    )
    .bind(kiosk_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// All known kiosks, ordered by `kiosk_id`.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn list(pool: &SqlitePool) -> Result<Vec<HeartbeatRow>, StorageError> {
    let rows = sqlx::query_as::<_, HeartbeatRow>("SELECT * FROM kiosk_heartbeat ORDER BY kiosk_id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Kiosks whose `last_seen` is older than `cutoff` and whose status isn't
/// already `offline` — candidates for the offline-detection sweep.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn find_stale(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<HeartbeatRow>, StorageError> {
    let rows = sqlx::query_as::<_, HeartbeatRow>(
        r"SELECT * FROM kiosk_heartbeat
          WHERE last_seen < ? AND status != 'offline'
          ORDER BY kiosk_id",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Force a kiosk's status, used by the offline sweep and by a kiosk's own
/// reconnect handler.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn set_status(pool: &SqlitePool, kiosk_id: &str, status: &str) -> Result<bool, StorageError> {
    let result = sqlx::query("UPDATE kiosk_heartbeat SET status = ? WHERE kiosk_id = ?")
        .bind(status)
        .bind(kiosk_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
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
    async fn upsert_then_find_stale() {
        let pool = pool().await;
        upsert(&pool, "k1", Some("zone-a"), "online", Some("1.0.0")).await.unwrap();

        let stale = find_stale(&pool, Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].kiosk_id, "k1");

        assert!(set_status(&pool, "k1", "offline").await.unwrap());
        let stale = find_stale(&pool, Utc::now() + chrono::Duration::seconds(1)).await.unwrap();
        assert!(stale.is_empty());
    }
}
