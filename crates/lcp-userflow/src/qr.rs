//! QR-code request orchestration. Device identifiers never reach the
//! LSM or event log in the clear — they are hashed with the same
//! [`FieldHasher`] the event log uses, so an `owner_key` column populated
//! by this flow and one later anonymized by `lcp-eventlog` agree.

use std::sync::Arc;

use lcp_core::{LockerStateManager, OwnerType};
use lcp_eventlog::FieldHasher;
use lcp_hardware::HardwareExecutor;
use lcp_ratelimit::{CheckOutcome, RateLimitScope, RateLimiter};
use tracing::{info, warn};

use crate::message_keys;

/// Result of one QR request. `Denied` carries the HTTP status the QR
/// contract names (423 for a VIP locker, 409 for a conflicting owner, 429
/// for rate limiting) alongside the stable message key.
#[derive(Debug, Clone, PartialEq)]
pub enum QrOutcome {
    Assigned { locker_id: i64 },
    Released { locker_id: i64 },
    HardwareError { locker_id: i64 },
    Denied { status_code: u16, message_key: &'static str, params: serde_json::Value },
}

fn denied(status_code: u16, message_key: &'static str, params: serde_json::Value) -> QrOutcome {
    QrOutcome::Denied { status_code, message_key, params }
}

fn rate_limit_denial(outcome: CheckOutcome) -> QrOutcome {
    match outcome {
        CheckOutcome::Allowed => unreachable!("caller checks is_allowed before calling this"),
        CheckOutcome::Denied { retry_after_secs } => denied(
            429,
            message_keys::RATE_LIMITED,
            serde_json::json!({ "retry_after_secs": retry_after_secs }),
        ),
        CheckOutcome::Blocked { retry_after_secs } => denied(
            429,
            message_keys::TEMPORARILY_BLOCKED,
            serde_json::json!({ "retry_after_secs": retry_after_secs }),
        ),
    }
}

/// Composes the rate limiter, LSM, and hardware executor into the QR entry
/// point.
pub struct QrFlow {
    lsm: Arc<LockerStateManager>,
    hardware: Arc<HardwareExecutor>,
    rate_limiter: Arc<RateLimiter>,
    hasher: FieldHasher,
}

impl QrFlow {
    #[must_use]
    pub fn new(
        lsm: Arc<LockerStateManager>,
        hardware: Arc<HardwareExecutor>,
        rate_limiter: Arc<RateLimiter>,
        hasher: FieldHasher,
    ) -> Self {
        Self { lsm, hardware, rate_limiter, hasher }
    }

    /// QR flow: `POST /locker/{id}?device={id}`.
    ///
    /// # Errors
    ///
    /// Returns [`lcp_core::LockerError::NotFound`] if `locker_id` doesn't
    /// exist, or a storage/hardware error on a database or bus failure.
    pub async fn handle_qr_request(
        &self,
        kiosk_id: &str,
        locker_id: i64,
        device_id: &str,
        ip: &str,
    ) -> Result<QrOutcome, crate::error::UserFlowError> {
        let device_key = self.hasher.hash(device_id);

        let ip_check = self.rate_limiter.check(RateLimitScope::Ip, ip).await;
        if !ip_check.is_allowed() {
            return Ok(rate_limit_denial(ip_check));
        }
        let device_check = self.rate_limiter.check(RateLimitScope::Device, &device_key).await;
        if !device_check.is_allowed() {
            return Ok(rate_limit_denial(device_check));
        }
        let locker_key = format!("{kiosk_id}:{locker_id}");
        let locker_check = self.rate_limiter.check(RateLimitScope::Locker, &locker_key).await;
        if !locker_check.is_allowed() {
            return Ok(rate_limit_denial(locker_check));
        }

        let locker = self.lsm.get(kiosk_id, locker_id).await?;
        if locker.is_vip {
            return Ok(denied(423, message_keys::VIP_LOCKER_QR_DISABLED, serde_json::json!({ "locker_id": locker_id })));
        }

        if locker.owner_key.is_none() {
            if !self.lsm.assign(kiosk_id, locker_id, OwnerType::Device, &device_key).await? {
                return Ok(denied(409, message_keys::LOCKER_CONFLICT, serde_json::json!({ "locker_id": locker_id })));
            }
            if !self.hardware.open_locker(kiosk_id, locker_id).await? {
                warn!(kiosk_id, locker_id, "locker assigned via QR but hardware open failed");
                return Ok(QrOutcome::HardwareError { locker_id });
            }
            info!(kiosk_id, locker_id, "locker assigned via QR");
            return Ok(QrOutcome::Assigned { locker_id });
        }

        if locker.owner_type == Some(OwnerType::Device) && locker.owner_key.as_deref() == Some(device_key.as_str())
        {
            if !self.hardware.open_locker(kiosk_id, locker_id).await? {
                return Ok(QrOutcome::HardwareError { locker_id });
            }
            return Ok(if self.lsm.release(kiosk_id, locker_id, &device_key).await? {
                info!(kiosk_id, locker_id, "locker released via QR");
                QrOutcome::Released { locker_id }
            } else {
                denied(409, message_keys::LOCKER_CONFLICT, serde_json::json!({ "locker_id": locker_id }))
            });
        }

        Ok(denied(
            409,
            message_keys::ALREADY_OWNED_ELSEWHERE,
            serde_json::json!({ "locker_id": locker_id }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lcp_core::broadcast::NullBroadcaster;
    use lcp_core::event_sink::NullEventSink;
    use lcp_core::CoreConfig;
    use lcp_hardware::transport::NullTransport;
    use lcp_hardware::HardwareSettings;
    use lcp_storage::{lockers, run_migrations, SqlitePool};

    use super::*;

    async fn flow() -> QrFlow {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        lockers::ensure_locker(&pool, "k1", 1, false, None).await.unwrap();
        lockers::ensure_locker(&pool, "k1", 2, true, None).await.unwrap();

        let config = Arc::new(CoreConfig::default());
        let lsm = Arc::new(LockerStateManager::new(
            pool,
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
        let rate_limiter = Arc::new(RateLimiter::new(config, Arc::new(NullEventSink)));
        QrFlow::new(lsm, hardware, rate_limiter, FieldHasher::new(b"test-key".to_vec()))
    }

    #[tokio::test]
    async fn first_request_assigns_then_second_from_same_device_releases() {
        let flow = flow().await;
        let outcome = flow.handle_qr_request("k1", 1, "device-1", "10.0.0.1").await.unwrap();
        assert_eq!(outcome, QrOutcome::Assigned { locker_id: 1 });

        let outcome = flow.handle_qr_request("k1", 1, "device-1", "10.0.0.1").await.unwrap();
        assert_eq!(outcome, QrOutcome::Released { locker_id: 1 });
    }

    #[tokio::test]
    async fn a_different_device_gets_a_conflict() {
        let flow = flow().await;
        flow.handle_qr_request("k1", 1, "device-1", "10.0.0.1").await.unwrap();
        let outcome = flow.handle_qr_request("k1", 1, "device-2", "10.0.0.2").await.unwrap();
        assert_eq!(
            outcome,
            QrOutcome::Denied {
                status_code: 409,
                message_key: message_keys::ALREADY_OWNED_ELSEWHERE,
                params: serde_json::json!({ "locker_id": 1 }),
            }
        );
    }

    #[tokio::test]
    async fn vip_locker_rejects_qr() {
        let flow = flow().await;
        let outcome = flow.handle_qr_request("k1", 2, "device-1", "10.0.0.1").await.unwrap();
        assert_eq!(
            outcome,
            QrOutcome::Denied {
                status_code: 423,
                message_key: message_keys::VIP_LOCKER_QR_DISABLED,
                params: serde_json::json!({ "locker_id": 2 }),
            }
        );
    }
}
