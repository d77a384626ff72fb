//! Schema migrations for the locker control plane's SQLite database.
//!
//! A single site runs one SQLite file in WAL mode. `run_migrations`
//! is idempotent — it only ever creates tables/indexes `IF NOT EXISTS` — so it
//! is safe to call on every process start.

use sqlx::SqlitePool;

use crate::error::StorageError;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS lockers (
    kiosk_id        TEXT    NOT NULL,
    id              INTEGER NOT NULL,
    status          TEXT    NOT NULL,
    owner_type      TEXT,
    owner_key       TEXT,
    reserved_at     TEXT,
    owned_at        TEXT,
    version         INTEGER NOT NULL DEFAULT 0,
    is_vip          INTEGER NOT NULL DEFAULT 0,
    display_name    TEXT,
    updated_at      TEXT    NOT NULL,
    PRIMARY KEY (kiosk_id, id)
);

CREATE INDEX IF NOT EXISTS idx_lockers_owner
    ON lockers (owner_key)
    WHERE status IN ('Owned', 'Opening');

CREATE TABLE IF NOT EXISTS command_queue (
    command_id      TEXT    PRIMARY KEY,
    kiosk_id        TEXT    NOT NULL,
    command_type    TEXT    NOT NULL,
    payload         TEXT    NOT NULL,
    status          TEXT    NOT NULL,
    retry_count     INTEGER NOT NULL DEFAULT 0,
    max_retries     INTEGER NOT NULL DEFAULT 3,
    next_attempt_at TEXT    NOT NULL,
    last_error      TEXT,
    created_at      TEXT    NOT NULL,
    executed_at     TEXT,
    completed_at    TEXT
);

CREATE INDEX IF NOT EXISTS idx_command_queue_pull
    ON command_queue (kiosk_id, status, next_attempt_at);

CREATE TABLE IF NOT EXISTS events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT    NOT NULL,
    kiosk_id    TEXT    NOT NULL,
    locker_id   INTEGER,
    event_type  TEXT    NOT NULL,
    rfid_card   TEXT,
    device_id   TEXT,
    staff_user  TEXT,
    details     TEXT    NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_events_kiosk_time
    ON events (kiosk_id, timestamp);

CREATE INDEX IF NOT EXISTS idx_events_type_time
    ON events (event_type, timestamp);

CREATE TABLE IF NOT EXISTS kiosk_heartbeat (
    kiosk_id                TEXT PRIMARY KEY,
    last_seen               TEXT NOT NULL,
    zone                    TEXT,
    status                  TEXT NOT NULL,
    version                 TEXT,
    telemetry_data          TEXT,
    last_telemetry_update   TEXT
);

CREATE TABLE IF NOT EXISTS telemetry_history (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    kiosk_id    TEXT NOT NULL,
    recorded_at TEXT NOT NULL,
    payload     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_telemetry_history_kiosk
    ON telemetry_history (kiosk_id, recorded_at);
";

/// Create every table and index the core depends on, if they don't already
/// exist. Also switches the connection to WAL mode for concurrent readers.
///
/// # Errors
///
/// Returns [`StorageError::Database`] if any statement fails.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .execute(pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON;").execute(pool).await?;
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;
    Ok(())
}
