//! Locker repository — the persisted half of the Locker State Manager.
//!
//! Every mutation here goes through `cas_update`, which applies the
//! `WHERE ... AND version = ?` predicate described above. A zero-row update
//! means a concurrent writer won the race; the caller (`lcp-core`'s LSM)
//! treats that as a logical failure, not a storage error.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::StorageError;

/// A persisted locker row, mirroring the `lockers` table exactly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LockerRow {
    pub kiosk_id: String,
    pub id: i64,
    pub status: String,
    pub owner_type: Option<String>,
    pub owner_key: Option<String>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub owned_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub is_vip: bool,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a caller wants to write on a successful CAS transition.
///
/// `None` fields are left unchanged; to clear a nullable column pass
/// `Some(None)` — wrapped in [`Patch`] rather than a bare `Option<Option<T>>`
/// so call sites stay readable.
#[derive(Debug, Clone, Default)]
pub struct LockerPatch {
    pub status: Option<String>,
    pub owner_type: Patch<String>,
    pub owner_key: Patch<String>,
    pub reserved_at: Patch<DateTime<Utc>>,
    pub owned_at: Patch<DateTime<Utc>>,
    pub display_name: Patch<String>,
}

/// A nullable field update: leave alone, set to a value, or clear.
#[derive(Debug, Clone, Default)]
pub enum Patch<T> {
    #[default]
    Unchanged,
    Set(T),
    Clear,
}

impl<T> Patch<T> {
    fn resolve(self, current: Option<T>) -> Option<T> {
        match self {
            Patch::Unchanged => current,
            Patch::Set(v) => Some(v),
            Patch::Clear => None,
        }
    }
}

/// Insert a locker row if one doesn't already exist for `(kiosk_id, id)`.
/// Used at kiosk initialization; a no-op on subsequent restarts.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn ensure_locker(
    pool: &SqlitePool,
    kiosk_id: &str,
    id: i64,
    is_vip: bool,
    display_name: Option<&str>,
) -> Result<(), StorageError> {
    let now = Utc::now();
    sqlx::query(
        r"INSERT INTO lockers (kiosk_id, id, status, version, is_vip, display_name, updated_at)
          VALUES (?, ?, 'Free', 0, ?, ?, ?)
          ON CONFLICT (kiosk_id, id) DO NOTHING",
    )
    .bind(kiosk_id)
    .bind(id)
    .bind(is_vip)
    .bind(display_name)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch a single locker by its composite key.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn get(pool: &SqlitePool, kiosk_id: &str, id: i64) -> Result<Option<LockerRow>, StorageError> {
    let row = sqlx::query_as::<_, LockerRow>(
        "SELECT * FROM lockers WHERE kiosk_id = ? AND id = ?",
    )
    .bind(kiosk_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Lockers that are Free and not VIP, optionally narrowed to an allow-list,
/// ordered by `id` ascending.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn get_available(
    pool: &SqlitePool,
    kiosk_id: &str,
    allowed_ids: Option<&[i64]>,
) -> Result<Vec<LockerRow>, StorageError> {
    let rows = match allowed_ids {
        None => {
            sqlx::query_as::<_, LockerRow>(
                "SELECT * FROM lockers WHERE kiosk_id = ? AND status = 'Free' AND is_vip = 0 ORDER BY id",
            )
            .bind(kiosk_id)
            .fetch_all(pool)
            .await?
        }
        Some(ids) => {
            let mut rows = Vec::new();
            for chunk in ids {
                if let Some(row) = get(pool, kiosk_id, *chunk).await? {
                    if row.status == "Free" && !row.is_vip {
                        rows.push(row);
                    }
                }
            }
            rows.sort_by_key(|r| r.id);
            rows
        }
    };
    Ok(rows)
}

/// The Free, non-VIP locker with the oldest `updated_at` (ties broken by
/// `id`), used for wear-leveling auto-assignment.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn get_oldest_available(
    pool: &SqlitePool,
    kiosk_id: &str,
    allowed_ids: Option<&[i64]>,
) -> Result<Option<LockerRow>, StorageError> {
    let mut candidates = get_available(pool, kiosk_id, allowed_ids).await?;
    candidates.sort_by(|a, b| a.updated_at.cmp(&b.updated_at).then(a.id.cmp(&b.id)));
    Ok(candidates.into_iter().next())
}

/// The active (Owned or Opening) locker held by `(owner_type, owner_key)`, if
/// any. At most one row matches, since a given owner can hold at most one
/// active locker at a time.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn find_active_by_owner(
    pool: &SqlitePool,
    owner_type: &str,
    owner_key: &str,
) -> Result<Option<LockerRow>, StorageError> {
    let row = sqlx::query_as::<_, LockerRow>(
        r"SELECT * FROM lockers
          WHERE owner_type = ? AND owner_key = ? AND status IN ('Owned', 'Opening')
          LIMIT 1",
    )
    .bind(owner_type)
    .bind(owner_key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Lockers currently Owned with `reserved_at` older than `cutoff` — the
/// auto-release sweeper's candidate set.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn find_expired_reservations(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<LockerRow>, StorageError> {
    let rows = sqlx::query_as::<_, LockerRow>(
        r"SELECT * FROM lockers
          WHERE status = 'Owned' AND reserved_at IS NOT NULL AND reserved_at <= ?
          ORDER BY kiosk_id, id",
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Whether `display_name` (already trimmed and case/whitespace-normalized by
/// the caller) is already used by another locker on this kiosk.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn display_name_taken(
    pool: &SqlitePool,
    kiosk_id: &str,
    normalized_name: &str,
    exclude_id: i64,
) -> Result<bool, StorageError> {
    let count: i64 = sqlx::query_scalar(
        r"SELECT COUNT(*) FROM lockers
          WHERE kiosk_id = ? AND id != ? AND display_name IS NOT NULL
            AND LOWER(TRIM(display_name)) = ?",
    )
    .bind(kiosk_id)
    .bind(exclude_id)
    .bind(normalized_name)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Apply a patch under the CAS predicate `version = version_read`. Returns
/// `Ok(None)` on a version mismatch (a concurrent writer won); this is a
/// logical failure, never an error.
///
/// # Errors
///
/// Returns [`StorageError::Database`] on connection failure.
pub async fn cas_update(
    pool: &SqlitePool,
    kiosk_id: &str,
    id: i64,
    version_read: i64,
    patch: LockerPatch,
) -> Result<Option<LockerRow>, StorageError> {
    let Some(current) = get(pool, kiosk_id, id).await? else {
        return Ok(None);
    };
    if current.version != version_read {
        return Ok(None);
    }

    let now = Utc::now();
    let status = patch.status.unwrap_or(current.status.clone());
    let owner_type = patch.owner_type.resolve(current.owner_type.clone());
    let owner_key = patch.owner_key.resolve(current.owner_key.clone());
    let reserved_at = patch.reserved_at.resolve(current.reserved_at);
    let owned_at = patch.owned_at.resolve(current.owned_at);
    let display_name = patch.display_name.resolve(current.display_name.clone());

    let result = sqlx::query(
        r"UPDATE lockers
          SET status = ?, owner_type = ?, owner_key = ?, reserved_at = ?, owned_at = ?,
              display_name = ?, version = version + 1, updated_at = ?
          WHERE kiosk_id = ? AND id = ? AND version = ?",
    )
    .bind(&status)
    .bind(&owner_type)
    .bind(&owner_key)
    .bind(reserved_at)
    .bind(owned_at)
    .bind(&display_name)
    .bind(now)
    .bind(kiosk_id)
    .bind(id)
    .bind(version_read)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get(pool, kiosk_id, id).await
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
    async fn cas_update_rejects_stale_version() {
        let pool = pool().await;
        ensure_locker(&pool, "k1", 1, false, None).await.unwrap();
        let row = get(&pool, "k1", 1).await.unwrap().unwrap();
        assert_eq!(row.version, 0);

        let patch = LockerPatch {
            status: Some("Owned".to_owned()),
            owner_type: Patch::Set("rfid".to_owned()),
            owner_key: Patch::Set("card-1".to_owned()),
            reserved_at: Patch::Set(Utc::now()),
            ..Default::default()
        };
        let updated = cas_update(&pool, "k1", 1, 0, patch.clone()).await.unwrap();
        assert!(updated.is_some());
        assert_eq!(updated.unwrap().version, 1);

        // Stale version_read of 0 must now fail.
        let stale = cas_update(&pool, "k1", 1, 0, patch).await.unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn get_available_excludes_vip_and_owned() {
        let pool = pool().await;
        ensure_locker(&pool, "k1", 1, false, None).await.unwrap();
        ensure_locker(&pool, "k1", 2, true, None).await.unwrap();
        cas_update(
            &pool,
            "k1",
            1,
            0,
            LockerPatch {
                status: Some("Owned".to_owned()),
                owner_type: Patch::Set("rfid".to_owned()),
                owner_key: Patch::Set("c1".to_owned()),
                reserved_at: Patch::Set(Utc::now()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let available = get_available(&pool, "k1", None).await.unwrap();
        assert!(available.is_empty());
    }
}
