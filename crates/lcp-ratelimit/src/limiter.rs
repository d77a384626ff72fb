//! The token-bucket limiter — in-memory state guarded by a
//! `tokio::sync::RwLock`, the same "shared map behind a lock" shape used
//! for the broadcast subscriber set and session manager.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lcp_core::config::BucketConfig;
use lcp_core::event_sink::{EventRecord, EventSink};
use lcp_core::CoreConfig;
use tokio::sync::RwLock;
use tracing::warn;

use crate::scope::RateLimitScope;

/// Outcome of a single [`RateLimiter::check`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Allowed,
    /// The bucket is empty; retry after this many seconds.
    Denied { retry_after_secs: u64 },
    /// The key is in a hard block from repeated violations.
    Blocked { retry_after_secs: u64 },
}

impl CheckOutcome {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last_refill: DateTime<Utc>,
    violation_count: u32,
    blocked_until: Option<DateTime<Utc>>,
    last_activity: DateTime<Utc>,
}

impl BucketState {
    fn fresh(now: DateTime<Utc>, max_tokens: f64) -> Self {
        Self { tokens: max_tokens, last_refill: now, violation_count: 0, blocked_until: None, last_activity: now }
    }

    #[allow(clippy::cast_precision_loss)]
    fn refill(&mut self, now: DateTime<Utc>, config: BucketConfig) {
        let elapsed = (now - self.last_refill).num_milliseconds().max(0) as f64 / 1000.0;
        self.tokens = (self.tokens + elapsed * config.refill_rate).min(config.max_tokens);
        self.last_refill = now;
    }
}

/// Per-scope token-bucket state with violation tracking and hard blocks
///. One instance is shared across all callers via `Arc`.
pub struct RateLimiter {
    buckets: RwLock<HashMap<(RateLimitScope, String), BucketState>>,
    config: Arc<CoreConfig>,
    sink: Arc<dyn EventSink>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: Arc<CoreConfig>, sink: Arc<dyn EventSink>) -> Self {
        Self { buckets: RwLock::new(HashMap::new()), config, sink }
    }

    fn bucket_config(&self, scope: RateLimitScope) -> BucketConfig {
        match scope {
            RateLimitScope::Ip => self.config.rate_limit_ip,
            RateLimitScope::Card => self.config.rate_limit_card,
            RateLimitScope::Locker => self.config.rate_limit_locker,
            RateLimitScope::Device => self.config.rate_limit_device,
        }
    }

    /// Consume one token from `scope`/`key`'s bucket, refilling first.
    /// Rejections increment `violation_count`; at `rate_limit_block_threshold`
    /// the key is hard-blocked for `rate_limit_block_duration_secs`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub async fn check(&self, scope: RateLimitScope, key: &str) -> CheckOutcome {
        let now = Utc::now();
        let bucket_config = self.bucket_config(scope);
        let mut buckets = self.buckets.write().await;
        let state =
            buckets.entry((scope, key.to_owned())).or_insert_with(|| BucketState::fresh(now, bucket_config.max_tokens));
        state.last_activity = now;

        if let Some(blocked_until) = state.blocked_until {
            if blocked_until > now {
                let retry_after_secs = (blocked_until - now).num_seconds().max(0) as u64;
                return CheckOutcome::Blocked { retry_after_secs };
            }
            state.blocked_until = None;
            state.violation_count = 0;
        }

        state.refill(now, bucket_config);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return CheckOutcome::Allowed;
        }

        state.violation_count += 1;
        let retry_after_secs = if bucket_config.refill_rate > 0.0 {
            ((1.0 - state.tokens) / bucket_config.refill_rate).ceil().max(0.0) as u64
        } else {
            0
        };

        if state.violation_count >= self.config.rate_limit_violation_log_threshold {
            self.sink
                .record(EventRecord {
                    kiosk_id: String::new(),
                    locker_id: None,
                    event_type: "rate_limit_violation",
                    rfid_card: None,
                    device_id: None,
                    staff_user: None,
                    details: serde_json::json!({
                        "scope": scope.as_str(),
                        "key": key,
                        "violation_count": state.violation_count,
                    }),
                })
                .await;
        }

        if state.violation_count >= self.config.rate_limit_block_threshold {
            let blocked_until = now + chrono::Duration::seconds(
                i64::try_from(self.config.rate_limit_block_duration_secs).unwrap_or(i64::MAX),
            );
            state.blocked_until = Some(blocked_until);
            warn!(scope = scope.as_str(), key, "rate limit violations reached block threshold");
            return CheckOutcome::Blocked { retry_after_secs: self.config.rate_limit_block_duration_secs };
        }

        CheckOutcome::Denied { retry_after_secs }
    }

    /// Administrative reset — clears bucket and violation state for `key`
    /// in `scope`. Fire-and-forget: a missing key is not an error.
    pub async fn reset(&self, scope: RateLimitScope, key: &str, staff_user: &str) {
        let mut buckets = self.buckets.write().await;
        buckets.remove(&(scope, key.to_owned()));
        self.sink
            .record(EventRecord {
                kiosk_id: String::new(),
                locker_id: None,
                event_type: "rate_limit_reset",
                rfid_card: None,
                device_id: None,
                staff_user: Some(staff_user.to_owned()),
                details: serde_json::json!({ "scope": scope.as_str(), "key": key }),
            })
            .await;
    }

    /// Removes buckets and violations idle for more than one hour.
    pub async fn cleanup(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(1);
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, state| state.last_activity > cutoff || state.blocked_until.is_some_and(|b| b > cutoff));
        before - buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use lcp_core::event_sink::NullEventSink;

    use super::*;

    fn limiter(config: CoreConfig) -> RateLimiter {
        RateLimiter::new(Arc::new(config), Arc::new(NullEventSink))
    }

    #[tokio::test]
    async fn bucket_starts_full_and_denies_once_exhausted() {
        let config = CoreConfig {
            rate_limit_device: BucketConfig { max_tokens: 1.0, refill_rate: 0.05 },
            ..CoreConfig::default()
        };
        let rl = limiter(config);
        assert_eq!(rl.check(RateLimitScope::Device, "dev-1").await, CheckOutcome::Allowed);
        assert!(!rl.check(RateLimitScope::Device, "dev-1").await.is_allowed());
    }

    #[tokio::test]
    async fn hard_block_after_threshold_violations() {
        let config = CoreConfig {
            rate_limit_ip: BucketConfig { max_tokens: 1.0, refill_rate: 0.0001 },
            rate_limit_block_threshold: 2,
            rate_limit_block_duration_secs: 60,
            ..CoreConfig::default()
        };
        let rl = limiter(config);
        assert_eq!(rl.check(RateLimitScope::Ip, "1.2.3.4").await, CheckOutcome::Allowed);
        // second call: bucket empty, violation 1 -> denied
        assert!(matches!(
            rl.check(RateLimitScope::Ip, "1.2.3.4").await,
            CheckOutcome::Denied { .. }
        ));
        // third call: violation 2 hits block_threshold -> blocked
        assert!(matches!(
            rl.check(RateLimitScope::Ip, "1.2.3.4").await,
            CheckOutcome::Blocked { .. }
        ));
    }

    #[tokio::test]
    async fn reset_clears_block() {
        let config = CoreConfig {
            rate_limit_card: BucketConfig { max_tokens: 1.0, refill_rate: 0.0001 },
            rate_limit_block_threshold: 1,
            ..CoreConfig::default()
        };
        let rl = limiter(config);
        assert_eq!(rl.check(RateLimitScope::Card, "C1").await, CheckOutcome::Allowed);
        assert!(matches!(rl.check(RateLimitScope::Card, "C1").await, CheckOutcome::Blocked { .. }));
        rl.reset(RateLimitScope::Card, "C1", "staff1").await;
        assert_eq!(rl.check(RateLimitScope::Card, "C1").await, CheckOutcome::Allowed);
    }
}
