//! Shared domain types, error taxonomy, and the Locker State Manager.
//!
//! This crate deliberately does not depend on `lcp-eventlog` or `lcp-fleet`
//! — the [`event_sink::EventSink`] and [`broadcast::StateBroadcaster`] ports
//! break what would otherwise be a dependency cycle.

pub mod broadcast;
pub mod config;
pub mod display_name;
pub mod domain;
pub mod error;
pub mod event_sink;
pub mod lsm;

pub use config::CoreConfig;
pub use domain::{Locker, LockerStatus, OwnerType};
pub use error::{ApiError, LockerError};
pub use lsm::LockerStateManager;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lcp_storage::lockers::ensure_locker;
    use lcp_storage::{run_migrations, SqlitePool};

    use crate::broadcast::NullBroadcaster;
    use crate::config::CoreConfig;
    use crate::domain::OwnerType;
    use crate::event_sink::NullEventSink;
    use crate::lsm::LockerStateManager;

    async fn manager() -> (LockerStateManager, SqlitePool) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let lsm = LockerStateManager::new(
            pool.clone(),
            Arc::new(NullEventSink),
            Arc::new(NullBroadcaster),
            Arc::new(CoreConfig::default()),
        );
        (lsm, pool)
    }

    #[tokio::test]
    async fn assign_then_release_round_trips_version_by_two() {
        let (lsm, pool) = manager().await;
        ensure_locker(&pool, "k1", 1, false, None).await.unwrap();

        assert!(lsm.assign("k1", 1, OwnerType::Rfid, "card-1").await.unwrap());
        let after_assign = lcp_storage::lockers::get(&pool, "k1", 1).await.unwrap().unwrap();
        assert_eq!(after_assign.version, 1);
        assert_eq!(after_assign.status, "Owned");

        assert!(lsm.release("k1", 1, "card-1").await.unwrap());
        let after_release = lcp_storage::lockers::get(&pool, "k1", 1).await.unwrap().unwrap();
        assert_eq!(after_release.version, 2);
        assert_eq!(after_release.status, "Free");
        assert!(after_release.owner_key.is_none());
    }

    #[tokio::test]
    async fn one_card_one_locker() {
        let (lsm, pool) = manager().await;
        ensure_locker(&pool, "k1", 1, false, None).await.unwrap();
        ensure_locker(&pool, "k1", 2, false, None).await.unwrap();

        assert!(lsm.assign("k1", 1, OwnerType::Rfid, "C1").await.unwrap());
        assert!(!lsm.assign("k1", 2, OwnerType::Rfid, "C1").await.unwrap());

        let locker2 = lcp_storage::lockers::get(&pool, "k1", 2).await.unwrap().unwrap();
        assert_eq!(locker2.status, "Free");
    }

    #[tokio::test]
    async fn vip_locker_excluded_from_assign_and_available() {
        let (lsm, pool) = manager().await;
        ensure_locker(&pool, "k1", 1, true, None).await.unwrap();

        assert!(!lsm.assign("k1", 1, OwnerType::Rfid, "C1").await.unwrap());
        let available = lsm.get_available("k1", None).await.unwrap();
        assert!(available.is_empty());
    }

    #[tokio::test]
    async fn concurrent_assign_exactly_one_winner() {
        let (lsm, pool) = manager().await;
        ensure_locker(&pool, "k1", 5, false, None).await.unwrap();

        let a = lsm.assign("k1", 5, OwnerType::Rfid, "C1").await.unwrap();
        let b = lsm.assign("k1", 5, OwnerType::Rfid, "C2").await.unwrap();
        assert!(a ^ b, "exactly one of the two concurrent assigns should win");
    }

    #[tokio::test]
    async fn auto_release_only_affects_lockers_past_the_deadline() {
        let (lsm, pool) = manager().await;
        ensure_locker(&pool, "k1", 1, false, None).await.unwrap();
        ensure_locker(&pool, "k1", 2, false, None).await.unwrap();
        lsm.assign("k1", 1, OwnerType::Rfid, "old-card").await.unwrap();
        lsm.assign("k1", 2, OwnerType::Rfid, "new-card").await.unwrap();

        // Back-date locker 1's reservation to simulate an hour-old hold.
        sqlx::query("UPDATE lockers SET reserved_at = ? WHERE kiosk_id = 'k1' AND id = 1")
            .bind(chrono::Utc::now() - chrono::Duration::hours(1))
            .execute(&pool)
            .await
            .unwrap();

        // ~3.6 seconds, matching the auto-release test scenario.
        let released = lsm.cleanup_expired_reservations(Some(0.001)).await.unwrap();
        assert_eq!(released, 1);

        let locker1 = lcp_storage::lockers::get(&pool, "k1", 1).await.unwrap().unwrap();
        assert_eq!(locker1.status, "Free");
        let locker2 = lcp_storage::lockers::get(&pool, "k1", 2).await.unwrap().unwrap();
        assert_eq!(locker2.status, "Owned");
    }
}
