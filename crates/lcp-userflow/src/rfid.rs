//! RFID card-scan and locker-selection orchestration.

use std::sync::Arc;

use lcp_core::{CoreConfig, LockerStateManager, OwnerType};
use lcp_fleet::SharedSessionManager;
use lcp_hardware::HardwareExecutor;
use lcp_ratelimit::{CheckOutcome, RateLimitScope, RateLimiter};
use tracing::{info, warn};

use crate::message_keys;

/// Result of one RFID flow call. Every rejection carries a stable
/// `message_key` plus structured `params`, never a rendered sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum RfidOutcome {
    /// No existing ownership; a selection session was opened.
    ShowAvailable { available_lockers: Vec<i64> },
    /// The card already owned a locker; it was opened and released.
    Released { locker_id: i64 },
    /// The selected locker was assigned, opened, and its opening confirmed.
    Assigned { locker_id: i64 },
    /// Hardware could not open the locker; it moved to Error state.
    HardwareError { locker_id: i64 },
    /// Rejected outright — rate limit, stale session, or a lost CAS race.
    Denied { message_key: &'static str, params: serde_json::Value },
}

fn denied(message_key: &'static str, params: serde_json::Value) -> RfidOutcome {
    RfidOutcome::Denied { message_key, params }
}

fn rate_limit_denial(outcome: CheckOutcome) -> RfidOutcome {
    match outcome {
        CheckOutcome::Allowed => unreachable!("caller checks is_allowed before calling this"),
        CheckOutcome::Denied { retry_after_secs } => {
            denied(message_keys::RATE_LIMITED, serde_json::json!({ "retry_after_secs": retry_after_secs }))
        }
        CheckOutcome::Blocked { retry_after_secs } => denied(
            message_keys::TEMPORARILY_BLOCKED,
            serde_json::json!({ "retry_after_secs": retry_after_secs }),
        ),
    }
}

/// Composes the rate limiter, LSM, hardware executor, and session manager
/// into the two public RFID entry points.
pub struct RfidFlow {
    lsm: Arc<LockerStateManager>,
    hardware: Arc<HardwareExecutor>,
    rate_limiter: Arc<RateLimiter>,
    sessions: SharedSessionManager,
    config: Arc<CoreConfig>,
}

impl RfidFlow {
    #[must_use]
    pub fn new(
        lsm: Arc<LockerStateManager>,
        hardware: Arc<HardwareExecutor>,
        rate_limiter: Arc<RateLimiter>,
        sessions: SharedSessionManager,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self { lsm, hardware, rate_limiter, sessions, config }
    }

    /// RFID flow, steps 1–3: card-scan at a kiosk reader.
    ///
    /// # Errors
    ///
    /// Returns [`lcp_core::LockerError`] or [`lcp_hardware::HardwareError`]
    /// on a database or bus failure.
    pub async fn handle_card_scan(
        &self,
        kiosk_id: &str,
        card_id: &str,
        ip: &str,
    ) -> Result<RfidOutcome, crate::error::UserFlowError> {
        let ip_check = self.rate_limiter.check(RateLimitScope::Ip, ip).await;
        if !ip_check.is_allowed() {
            return Ok(rate_limit_denial(ip_check));
        }
        let card_check = self.rate_limiter.check(RateLimitScope::Card, card_id).await;
        if !card_check.is_allowed() {
            return Ok(rate_limit_denial(card_check));
        }

        if let Some(locker) = self.lsm.check_existing_ownership(card_id, OwnerType::Rfid).await? {
            let opened = self.hardware.open_locker(kiosk_id, locker.id).await?;
            if !opened {
                return Ok(RfidOutcome::HardwareError { locker_id: locker.id });
            }
            return Ok(if self.lsm.release(kiosk_id, locker.id, card_id).await? {
                info!(kiosk_id, locker_id = locker.id, "card released its locker");
                RfidOutcome::Released { locker_id: locker.id }
            } else {
                denied(message_keys::LOCKER_CONFLICT, serde_json::json!({ "locker_id": locker.id }))
            });
        }

        let available = self.lsm.get_available(kiosk_id, None).await?;
        let available_lockers: Vec<i64> = available.iter().map(|l| l.id).collect();
        self.sessions
            .open(kiosk_id, card_id, available_lockers.clone(), self.config.reserve_ttl_seconds)
            .await;
        Ok(RfidOutcome::ShowAvailable { available_lockers })
    }

    /// RFID flow, step 4: the reader reports which of the offered
    /// lockers the cardholder picked.
    ///
    /// # Errors
    ///
    /// Returns [`lcp_core::LockerError`] or [`lcp_hardware::HardwareError`]
    /// on a database or bus failure.
    pub async fn handle_locker_selection(
        &self,
        kiosk_id: &str,
        card_id: &str,
        locker_id: i64,
    ) -> Result<RfidOutcome, crate::error::UserFlowError> {
        let Some(session) = self.sessions.get_active(kiosk_id).await else {
            return Ok(denied(message_keys::NO_ACTIVE_SESSION, serde_json::json!({})));
        };
        if session.card_id != card_id || !session.available_lockers.contains(&locker_id) {
            return Ok(denied(message_keys::LOCKER_NOT_OFFERED, serde_json::json!({ "locker_id": locker_id })));
        }

        if !self.lsm.assign(kiosk_id, locker_id, OwnerType::Rfid, card_id).await? {
            return Ok(denied(message_keys::LOCKER_CONFLICT, serde_json::json!({ "locker_id": locker_id })));
        }
        self.sessions.complete(kiosk_id).await;

        if !self.hardware.open_locker(kiosk_id, locker_id).await? {
            warn!(kiosk_id, locker_id, "locker assigned but hardware open failed");
            return Ok(RfidOutcome::HardwareError { locker_id });
        }
        self.lsm.confirm_opening(kiosk_id, locker_id, card_id).await?;
        Ok(RfidOutcome::Assigned { locker_id })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lcp_core::broadcast::NullBroadcaster;
    use lcp_core::event_sink::NullEventSink;
    use lcp_fleet::SessionManager;
    use lcp_hardware::transport::NullTransport;
    use lcp_hardware::{HardwareExecutor, HardwareSettings};
    use lcp_storage::{lockers, run_migrations, SqlitePool};

    use super::*;

    async fn flow() -> RfidFlow {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        lockers::ensure_locker(&pool, "k1", 1, false, None).await.unwrap();
        lockers::ensure_locker(&pool, "k1", 2, false, None).await.unwrap();

        let config = Arc::new(CoreConfig::default());
        let lsm = Arc::new(LockerStateManager::new(
            pool.clone(),
            Arc::new(NullEventSink),
            Arc::new(NullBroadcaster),
            config.clone(),
        ));
        let hardware = Arc::new(HardwareExecutor::spawn(
            Arc::new(NullTransport::new(true)),
            lsm.clone(),
            Arc::new(NullEventSink),
            HardwareSettings::test(),
        ));
        let rate_limiter = Arc::new(RateLimiter::new(config.clone(), Arc::new(NullEventSink)));
        let sessions = Arc::new(SessionManager::new());
        RfidFlow::new(lsm, hardware, rate_limiter, sessions, config)
    }

    #[tokio::test]
    async fn first_scan_offers_available_lockers_then_selection_assigns() {
        let flow = flow().await;
        let outcome = flow.handle_card_scan("k1", "card-1", "10.0.0.1").await.unwrap();
        let RfidOutcome::ShowAvailable { available_lockers } = outcome else {
            panic!("expected ShowAvailable, got {outcome:?}");
        };
        assert_eq!(available_lockers, vec![1, 2]);

        let outcome = flow.handle_locker_selection("k1", "card-1", 1).await.unwrap();
        assert_eq!(outcome, RfidOutcome::Assigned { locker_id: 1 });
    }

    #[tokio::test]
    async fn rescanning_an_owned_card_releases_its_locker() {
        let flow = flow().await;
        flow.handle_card_scan("k1", "card-1", "10.0.0.1").await.unwrap();
        flow.handle_locker_selection("k1", "card-1", 1).await.unwrap();

        let outcome = flow.handle_card_scan("k1", "card-1", "10.0.0.1").await.unwrap();
        assert_eq!(outcome, RfidOutcome::Released { locker_id: 1 });
    }

    #[tokio::test]
    async fn selecting_a_locker_not_offered_is_denied() {
        let flow = flow().await;
        flow.handle_card_scan("k1", "card-1", "10.0.0.1").await.unwrap();
        let outcome = flow.handle_locker_selection("k1", "card-1", 99).await.unwrap();
        assert_eq!(
            outcome,
            RfidOutcome::Denied {
                message_key: message_keys::LOCKER_NOT_OFFERED,
                params: serde_json::json!({ "locker_id": 99 }),
            }
        );
    }
}
