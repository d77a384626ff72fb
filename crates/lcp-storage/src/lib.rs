//! Persistent state store for the locker control plane.
//!
//! SQLite-backed repositories for the four persisted aggregates: lockers,
//! the command queue, the event log, and kiosk heartbeats/telemetry. Every
//! table and query here is a direct translation of the persisted schema; domain rules
//! (state machine transitions, retention policy, sanitization) live above
//! this crate in `lcp-core`, `lcp-queue`, and `lcp-eventlog`.

pub mod commands;
pub mod error;
pub mod events;
pub mod heartbeats;
pub mod lockers;
pub mod schema;
pub mod telemetry;

pub use error::StorageError;
pub use schema::run_migrations;
pub use sqlx::SqlitePool;

/// Open (creating if necessary) a SQLite database file and run migrations.
///
/// `path` is a filesystem path, not a `sqlite://` URL; this mirrors how
/// `CoreConfig` hands the store a plain path from `LCP_DB_PATH`.
///
/// # Errors
///
/// Returns [`StorageError::Database`] if the file can't be opened or created,
/// or if migrations fail.
pub async fn open(path: &str) -> Result<SqlitePool, StorageError> {
    let url = format!("sqlite://{path}?mode=rwc");
    let pool = SqlitePool::connect(&url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
