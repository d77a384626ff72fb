//! Command queue repository — the persisted half of the Command Queue.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::StorageError;

/// A queued command row, mirroring `command_queue` exactly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CommandRow {
    pub command_id: String,
    pub kiosk_id: String,
    pub command_type: String,
    pub payload: String,
    pub status: String,
    pub retry_count: i64,
    pub max_retries: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Per-kiosk counts by status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub executing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

/// Insert a new command in `pending` status. Returns its generated UUID v4.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn enqueue(
    pool: &SqlitePool,
    kiosk_id: &str,
    command_type: &str,
    payload: &serde_json::Value,
    max_retries: i64,
) -> Result<String, StorageError> {
    let command_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r"INSERT INTO command_queue
              (command_id, kiosk_id, command_type, payload, status, retry_count,
               max_retries, next_attempt_at, created_at)
          VALUES (?, ?, ?, ?, 'pending', 0, ?, ?, ?)",
    )
    .bind(&command_id)
    .bind(kiosk_id)
    .bind(command_type)
    .bind(payload.to_string())
    .bind(max_retries)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(command_id)
}

/// Commands ready to run: `pending` with `next_attempt_at <= now`, oldest
/// first. Does not change their status.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn pull_pending(
    pool: &SqlitePool,
    kiosk_id: &str,
    limit: i64,
    now: DateTime<Utc>,
) -> Result<Vec<CommandRow>, StorageError> {
    let rows = sqlx::query_as::<_, CommandRow>(
        r"SELECT * FROM command_queue
          WHERE kiosk_id = ? AND status = 'pending' AND next_attempt_at <= ?
          ORDER BY created_at ASC
          LIMIT ?",
    )
    .bind(kiosk_id)
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Mark a command `executing` and stamp `executed_at`.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn mark_executing(pool: &SqlitePool, command_id: &str) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE command_queue SET status = 'executing', executed_at = ? WHERE command_id = ?",
    )
    .bind(Utc::now())
    .bind(command_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a command `completed` and stamp `completed_at`. Returns `false` if no
/// row matched.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn mark_completed(pool: &SqlitePool, command_id: &str) -> Result<bool, StorageError> {
    let result = sqlx::query(
        "UPDATE command_queue SET status = 'completed', completed_at = ? WHERE command_id = ?",
    )
    .bind(Utc::now())
    .bind(command_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Record a failed attempt. Reschedules with exponential backoff
/// (`next_attempt_at = now + 2^retry_count * base_delay`) unless retries are
/// exhausted, in which case the row is marked `failed`.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn mark_failed(
    pool: &SqlitePool,
    command_id: &str,
    error: &str,
    base_delay: chrono::Duration,
) -> Result<bool, StorageError> {
    let Some(row) = sqlx::query_as::<_, CommandRow>(
        "SELECT * FROM command_queue WHERE command_id = ?",
    )
    .bind(command_id)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(false);
    };

    if row.status == "failed" {
        // Already terminal — further failure reports are no-ops.
        return Ok(true);
    }

    let new_retry_count = row.retry_count + 1;
    if new_retry_count >= row.max_retries {
        sqlx::query(
            "UPDATE command_queue SET status = 'failed', retry_count = ?, last_error = ? WHERE command_id = ?",
        )
        .bind(new_retry_count)
        .bind(error)
        .bind(command_id)
        .execute(pool)
        .await?;
    } else {
        let delay = base_delay * 2i32.pow(u32::try_from(new_retry_count).unwrap_or(u32::MAX));
        let next_attempt_at = Utc::now() + delay;
        sqlx::query(
            r"UPDATE command_queue
              SET status = 'pending', retry_count = ?, last_error = ?, next_attempt_at = ?
              WHERE command_id = ?",
        )
        .bind(new_retry_count)
        .bind(error)
        .bind(next_attempt_at)
        .bind(command_id)
        .execute(pool)
        .await?;
    }
    Ok(true)
}

/// Cancel every `pending` command for a kiosk — used after a kiosk restart to
/// drop stale work. Returns the number cancelled.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn cancel_pending(pool: &SqlitePool, kiosk_id: &str) -> Result<u64, StorageError> {
    let result = sqlx::query(
        "UPDATE command_queue SET status = 'cancelled' WHERE kiosk_id = ? AND status = 'pending'",
    )
    .bind(kiosk_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Null-coalesced counts by status for a kiosk.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn stats(pool: &SqlitePool, kiosk_id: &str) -> Result<QueueStats, StorageError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT status, COUNT(*) FROM command_queue WHERE kiosk_id = ? GROUP BY status",
    )
    .bind(kiosk_id)
    .fetch_all(pool)
    .await?;

    let mut out = QueueStats::default();
    for (status, count) in rows {
        match status.as_str() {
            "pending" => out.pending = count,
            "executing" => out.executing = count,
            "completed" => out.completed = count,
            "failed" => out.failed = count,
            "cancelled" => out.cancelled = count,
            _ => {}
        }
    }
    Ok(out)
}

/// Delete terminal commands (`completed`, `failed`, `cancelled`) created
/// before the retention cutoff. Returns the number
/// deleted.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn cleanup_old(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
    let result = sqlx::query(
        r"DELETE FROM command_queue
          WHERE status IN ('completed', 'failed', 'cancelled') AND created_at < ?",
    )
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
    async fn enqueue_then_pull_then_complete() {
        let pool = pool().await;
        let id = enqueue(&pool, "k1", "open_locker", &serde_json::json!({"locker_id": 3}), 3)
            .await
            .unwrap();

        let pulled = pull_pending(&pool, "k1", 10, Utc::now()).await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].command_id, id);

        assert!(mark_completed(&pool, &id).await.unwrap());
        let pulled_again = pull_pending(&pool, "k1", 10, Utc::now()).await.unwrap();
        assert!(pulled_again.is_empty());
    }

    #[tokio::test]
    async fn mark_failed_backs_off_then_terminates() {
        let pool = pool().await;
        let id = enqueue(&pool, "k1", "open_locker", &serde_json::json!({}), 2)
            .await
            .unwrap();

        let before = Utc::now();
        mark_failed(&pool, &id, "bus_timeout", chrono::Duration::seconds(30))
            .await
            .unwrap();
        let row = sqlx::query_as::<_, CommandRow>("SELECT * FROM command_queue WHERE command_id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.status, "pending");
        assert_eq!(row.retry_count, 1);
        let delay = row.next_attempt_at - before;
        assert!((delay.num_seconds() - 60).abs() <= 1);

        // Second failure exhausts max_retries=2.
        mark_failed(&pool, &id, "bus_timeout", chrono::Duration::seconds(30))
            .await
            .unwrap();
        let row = sqlx::query_as::<_, CommandRow>("SELECT * FROM command_queue WHERE command_id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.status, "failed");

        // Further failures on a terminal row are no-ops.
        let ok = mark_failed(&pool, &id, "bus_timeout", chrono::Duration::seconds(30))
            .await
            .unwrap();
        assert!(ok);
        let row = sqlx::query_as::<_, CommandRow>("SELECT * FROM command_queue WHERE command_id = ?")
            .bind(&id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.status, "failed");
    }
}
