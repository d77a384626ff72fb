//! The Command Queue — a thin domain layer over
//! `lcp_storage::commands`, translating typed payloads to/from the
//! persisted JSON column.

use chrono::{DateTime, Utc};
use lcp_storage::commands::{self, QueueStats};
use lcp_storage::SqlitePool;
use tracing::{info, warn};

use crate::error::QueueError;
use crate::payload::{CommandPayload, CommandType};

/// A queued command with its payload decoded.
#[derive(Debug, Clone)]
pub struct Command {
    pub command_id: String,
    pub kiosk_id: String,
    pub command_type: CommandType,
    pub payload: CommandPayload,
    pub status: String,
    pub retry_count: i64,
    pub max_retries: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Command {
    fn from_row(row: commands::CommandRow) -> Result<Self, QueueError> {
        let command_type = CommandType::parse(&row.command_type)?;
        let payload: CommandPayload = serde_json::from_str(&row.payload).map_err(|e| {
            QueueError::Validation { reason: format!("malformed command payload: {e}") }
        })?;
        Ok(Self {
            command_id: row.command_id,
            kiosk_id: row.kiosk_id,
            command_type,
            payload,
            status: row.status,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            next_attempt_at: row.next_attempt_at,
            last_error: row.last_error,
            created_at: row.created_at,
            executed_at: row.executed_at,
            completed_at: row.completed_at,
        })
    }
}

/// Base delay for exponential backoff and default retention/retry settings
///.
#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub base_delay_secs: u64,
    pub default_max_retries: i64,
    pub retention_days: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self { base_delay_secs: 30, default_max_retries: 3, retention_days: 7 }
    }
}

/// The persisted, at-least-once Command Queue.
pub struct CommandQueue {
    pool: SqlitePool,
    settings: QueueSettings,
}

impl CommandQueue {
    #[must_use]
    pub fn new(pool: SqlitePool, settings: QueueSettings) -> Self {
        Self { pool, settings }
    }

    /// `enqueue`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on a database failure.
    pub async fn enqueue(
        &self,
        kiosk_id: &str,
        payload: &CommandPayload,
        max_retries: Option<i64>,
    ) -> Result<String, QueueError> {
        let command_type = payload.command_type();
        let payload_json = serde_json::to_value(payload).map_err(|e| QueueError::Validation {
            reason: format!("failed to serialize command payload: {e}"),
        })?;
        let id = commands::enqueue(
            &self.pool,
            kiosk_id,
            command_type.as_str(),
            &payload_json,
            max_retries.unwrap_or(self.settings.default_max_retries),
        )
        .await?;
        info!(kiosk_id, command_id = %id, command_type = command_type.as_str(), "command enqueued");
        Ok(id)
    }

    /// `enqueue_bulk` — equivalent to N independent enqueues; no
    /// cross-command atomicity is required.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] on a database failure.
    pub async fn enqueue_bulk(
        &self,
        kiosk_id: &str,
        payloads: &[CommandPayload],
        max_retries: Option<i64>,
    ) -> Result<Vec<String>, QueueError> {
        let mut ids = Vec::with_capacity(payloads.len());
        for payload in payloads {
            ids.push(self.enqueue(kiosk_id, payload, max_retries).await?);
        }
        Ok(ids)
    }

    /// `pull_pending`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`] or [`QueueError::Validation`] if a
    /// row's payload no longer decodes.
    pub async fn pull_pending(&self, kiosk_id: &str, limit: i64) -> Result<Vec<Command>, QueueError> {
        let rows = commands::pull_pending(&self.pool, kiosk_id, limit, Utc::now()).await?;
        rows.into_iter().map(Command::from_row).collect()
    }

    /// # Errors
    ///
    /// Returns [`QueueError::Storage`].
    pub async fn mark_executing(&self, command_id: &str) -> Result<(), QueueError> {
        commands::mark_executing(&self.pool, command_id).await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`QueueError::Storage`].
    pub async fn mark_completed(&self, command_id: &str) -> Result<bool, QueueError> {
        let ok = commands::mark_completed(&self.pool, command_id).await?;
        if ok {
            info!(command_id, "command completed");
        }
        Ok(ok)
    }

    /// `mark_failed` — exponential backoff with the literal schedule:
    /// retry 1 → 60s, retry 2 → 120s, retry 3 → 240s.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`].
    pub async fn mark_failed(&self, command_id: &str, error: &str) -> Result<bool, QueueError> {
        warn!(command_id, error, "command failed, applying backoff");
        let ok = commands::mark_failed(
            &self.pool,
            command_id,
            error,
            chrono::Duration::seconds(i64::try_from(self.settings.base_delay_secs).unwrap_or(30)),
        )
        .await?;
        Ok(ok)
    }

    /// `cancel_pending`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`].
    pub async fn cancel_pending(&self, kiosk_id: &str) -> Result<u64, QueueError> {
        let count = commands::cancel_pending(&self.pool, kiosk_id).await?;
        info!(kiosk_id, count, "pending commands cancelled");
        Ok(count)
    }

    /// # Errors
    ///
    /// Returns [`QueueError::Storage`].
    pub async fn stats(&self, kiosk_id: &str) -> Result<QueueStats, QueueError> {
        Ok(commands::stats(&self.pool, kiosk_id).await?)
    }

    /// `cleanup_old`, using `settings.retention_days` as the cutoff.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Storage`].
    pub async fn cleanup_old(&self) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(self.settings.retention_days));
        let count = commands::cleanup_old(&self.pool, cutoff).await?;
        if count > 0 {
            info!(count, "stale commands purged");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn queue() -> CommandQueue {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        lcp_storage::run_migrations(&pool).await.unwrap();
        CommandQueue::new(pool, QueueSettings::default())
    }

    #[tokio::test]
    async fn enqueue_pull_complete_round_trip() {
        let q = queue().await;
        let payload = CommandPayload::OpenLocker { locker_id: 3, staff_user: None, reason: None };
        let id = q.enqueue("k1", &payload, None).await.unwrap();

        let pulled = q.pull_pending("k1", 10).await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].command_id, id);
        assert_eq!(pulled[0].command_type, CommandType::OpenLocker);

        assert!(q.mark_completed(&id).await.unwrap());
        assert!(q.pull_pending("k1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_failed_requeues_then_terminates() {
        let q = CommandQueue::new(
            {
                let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
                lcp_storage::run_migrations(&pool).await.unwrap();
                pool
            },
            QueueSettings { base_delay_secs: 30, default_max_retries: 1, retention_days: 7 },
        );
        let payload = CommandPayload::OpenLocker { locker_id: 1, staff_user: None, reason: None };
        let id = q.enqueue("k1", &payload, None).await.unwrap();

        assert!(q.mark_failed(&id, "bus_timeout").await.unwrap());
        // max_retries=1, so a single failure already exhausts retries.
        let stats = q.stats("k1").await.unwrap();
        assert_eq!(stats.failed, 1);
    }
}
