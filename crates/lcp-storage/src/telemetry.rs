//! Telemetry history repository — time series of kiosk telemetry snapshots
//! a time series of snapshots layered on top of the heartbeat table.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// One recorded telemetry snapshot.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TelemetryRow {
    pub id: i64,
    pub kiosk_id: String,
    pub recorded_at: DateTime<Utc>,
    pub payload: String,
}

/// Append a telemetry snapshot for a kiosk.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn record(
    pool: &SqlitePool,
    kiosk_id: &str,
    payload: &serde_json::Value,
) -> Result<i64, StorageError> {
    let result = sqlx::query(
        "INSERT INTO telemetry_history (kiosk_id, recorded_at, payload) VALUES (?, ?, ?)",
    )
    .bind(kiosk_id)
    .bind(Utc::now())
    .bind(payload.to_string())
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

/// The most recent `limit` snapshots for a kiosk, newest first.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn recent(
    pool: &SqlitePool,
    kiosk_id: &str,
    limit: i64,
) -> Result<Vec<TelemetryRow>, StorageError> {
    let rows = sqlx::query_as::<_, TelemetryRow>(
        r"SELECT * FROM telemetry_history
          WHERE kiosk_id = ?
          ORDER BY recorded_at DESC
          LIMIT ?",
    )
    .bind(kiosk_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Delete snapshots older than `cutoff`, across all kiosks.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn cleanup_old(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
    let result = sqlx::query("DELETE FROM telemetry_history WHERE recorded_at < ?")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
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
    async fn record_then_recent_is_newest_first() {
        let pool = pool().await;
        record(&pool, "k1", &serde_json::json!({"temp_c": 21})).await.unwrap();
        record(&pool, "k1", &serde_json::json!({"temp_c": 22})).await.unwrap();

        let rows = recent(&pool, "k1", 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].recorded_at >= rows[1].recorded_at);
    }
}
