//! In-process configuration.
//!
//! Parsing an actual TOML/YAML config file is the external collaborator's
//! job; `CoreConfig::from_env` is the ambient stand-in, loaded from `LCP_*`
//! environment variables with documented defaults and no required settings.

use crate::error::LockerError;

/// Rate-limit bucket parameters for one scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketConfig {
    pub max_tokens: f64,
    pub refill_rate: f64,
}

/// Every tunable the core exposes, collected in one place and passed by
/// `Arc` to every component at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Deadline for the auto-release sweeper; `None` disables it.
    pub auto_release_hours: Option<f64>,
    /// RFID session timeout.
    pub reserve_ttl_seconds: u64,
    /// Heartbeat staleness cutoff before a kiosk is marked offline.
    pub offline_threshold_seconds: u64,
    /// Delay between pulses in a `bulk_open` sequence.
    pub bulk_operation_interval_ms: u64,
    /// Interval between session-expiry sweeps.
    pub cleanup_interval_ms: u64,
    /// Consecutive master-PIN failures before lockout.
    pub master_lockout_fails: u32,
    /// Lockout duration once `master_lockout_fails` is reached.
    pub master_lockout_minutes: u64,

    pub rate_limit_ip: BucketConfig,
    pub rate_limit_card: BucketConfig,
    pub rate_limit_locker: BucketConfig,
    pub rate_limit_device: BucketConfig,
    /// Rejections before a key enters a hard block.
    pub rate_limit_block_threshold: u32,
    /// Hard-block duration once `rate_limit_block_threshold` is reached.
    pub rate_limit_block_duration_secs: u64,
    /// Violations at or above this count emit a `rate_limit_violation` event.
    pub rate_limit_violation_log_threshold: u32,

    /// Relay energise duration per pulse.
    pub pulse_duration_ms: u64,
    /// Maximum duration of burst-mode retries.
    pub burst_duration_seconds: u64,
    /// Delay between pulses while in burst mode.
    pub burst_interval_ms: u64,
    /// Minimum spacing between any two bus commands.
    pub command_interval_ms: u64,

    /// Retention for regular (non-audit) events.
    pub event_retention_days: u32,
    /// Retention for staff/audit events.
    pub audit_retention_days: u32,
    /// Retention for operational logs (telemetry history, etc.).
    pub file_log_retention_days: u32,
    /// Whether the anonymization sweep runs at all.
    pub anonymization_enabled: bool,

    /// Base delay for command-queue exponential backoff.
    pub command_base_delay_secs: u64,
    /// Default `max_retries` for a newly-enqueued command.
    pub command_max_retries: i64,
    /// Retention for terminal commands (completed/failed/cancelled).
    pub command_retention_days: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            auto_release_hours: Some(24.0),
            reserve_ttl_seconds: 25,
            offline_threshold_seconds: 30,
            bulk_operation_interval_ms: 300,
            cleanup_interval_ms: 5_000,
            master_lockout_fails: 5,
            master_lockout_minutes: 15,

            rate_limit_ip: BucketConfig { max_tokens: 30.0, refill_rate: 0.5 },
            rate_limit_card: BucketConfig { max_tokens: 60.0, refill_rate: 1.0 },
            rate_limit_locker: BucketConfig { max_tokens: 6.0, refill_rate: 0.1 },
            rate_limit_device: BucketConfig { max_tokens: 1.0, refill_rate: 0.05 },
            rate_limit_block_threshold: 10,
            rate_limit_block_duration_secs: 900,
            rate_limit_violation_log_threshold: 3,

            pulse_duration_ms: 400,
            burst_duration_seconds: 10,
            burst_interval_ms: 2000,
            command_interval_ms: 300,

            event_retention_days: 30,
            audit_retention_days: 90,
            file_log_retention_days: 30,
            anonymization_enabled: true,

            command_base_delay_secs: 30,
            command_max_retries: 3,
            command_retention_days: 7,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl CoreConfig {
    /// Load configuration from `LCP_*` environment variables, falling back to
    /// [`CoreConfig::default`] for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let auto_release_hours = match std::env::var("LCP_AUTO_RELEASE_HOURS") {
            Ok(v) if v.eq_ignore_ascii_case("null") || v.is_empty() => None,
            Ok(v) => v.parse().ok().or(defaults.auto_release_hours),
            Err(_) => defaults.auto_release_hours,
        };

        Self {
            auto_release_hours,
            reserve_ttl_seconds: env_parse("LCP_RESERVE_TTL_SECONDS", defaults.reserve_ttl_seconds),
            offline_threshold_seconds: env_parse(
                "LCP_OFFLINE_THRESHOLD_SECONDS",
                defaults.offline_threshold_seconds,
            ),
            bulk_operation_interval_ms: env_parse(
                "LCP_BULK_OPERATION_INTERVAL_MS",
                defaults.bulk_operation_interval_ms,
            ),
            cleanup_interval_ms: env_parse(
                "LCP_CLEANUP_INTERVAL_MS",
                defaults.cleanup_interval_ms,
            ),
            master_lockout_fails: env_parse("LCP_MASTER_LOCKOUT_FAILS", defaults.master_lockout_fails),
            master_lockout_minutes: env_parse(
                "LCP_MASTER_LOCKOUT_MINUTES",
                defaults.master_lockout_minutes,
            ),

            rate_limit_ip: BucketConfig {
                max_tokens: env_parse("LCP_RATE_LIMIT_IP_MAX_TOKENS", defaults.rate_limit_ip.max_tokens),
                refill_rate: env_parse(
                    "LCP_RATE_LIMIT_IP_REFILL_RATE",
                    defaults.rate_limit_ip.refill_rate,
                ),
            },
            rate_limit_card: BucketConfig {
                max_tokens: env_parse(
                    "LCP_RATE_LIMIT_CARD_MAX_TOKENS",
                    defaults.rate_limit_card.max_tokens,
                ),
                refill_rate: env_parse(
                    "LCP_RATE_LIMIT_CARD_REFILL_RATE",
                    defaults.rate_limit_card.refill_rate,
                ),
            },
            rate_limit_locker: BucketConfig {
                max_tokens: env_parse(
                    "LCP_RATE_LIMIT_LOCKER_MAX_TOKENS",
                    defaults.rate_limit_locker.max_tokens,
                ),
                refill_rate: env_parse(
                    "LCP_RATE_LIMIT_LOCKER_REFILL_RATE",
                    defaults.rate_limit_locker.refill_rate,
                ),
            },
            rate_limit_device: BucketConfig {
                max_tokens: env_parse(
                    "LCP_RATE_LIMIT_DEVICE_MAX_TOKENS",
                    defaults.rate_limit_device.max_tokens,
                ),
                refill_rate: env_parse(
                    "LCP_RATE_LIMIT_DEVICE_REFILL_RATE",
                    defaults.rate_limit_device.refill_rate,
                ),
            },
            rate_limit_block_threshold: env_parse(
                "LCP_RATE_LIMIT_BLOCK_THRESHOLD",
                defaults.rate_limit_block_threshold,
            ),
            rate_limit_block_duration_secs: env_parse(
                "LCP_RATE_LIMIT_BLOCK_DURATION_SECS",
                defaults.rate_limit_block_duration_secs,
            ),
            rate_limit_violation_log_threshold: env_parse(
                "LCP_RATE_LIMIT_VIOLATION_LOG_THRESHOLD",
                defaults.rate_limit_violation_log_threshold,
            ),

            pulse_duration_ms: env_parse("LCP_PULSE_DURATION_MS", defaults.pulse_duration_ms),
            burst_duration_seconds: env_parse(
                "LCP_BURST_DURATION_SECONDS",
                defaults.burst_duration_seconds,
            ),
            burst_interval_ms: env_parse("LCP_BURST_INTERVAL_MS", defaults.burst_interval_ms),
            command_interval_ms: env_parse("LCP_COMMAND_INTERVAL_MS", defaults.command_interval_ms),

            event_retention_days: env_parse("LCP_EVENT_RETENTION_DAYS", defaults.event_retention_days),
            audit_retention_days: env_parse("LCP_AUDIT_RETENTION_DAYS", defaults.audit_retention_days),
            file_log_retention_days: env_parse(
                "LCP_FILE_LOG_RETENTION_DAYS",
                defaults.file_log_retention_days,
            ),
            anonymization_enabled: std::env::var("LCP_ANONYMIZATION_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.anonymization_enabled),

            command_base_delay_secs: env_parse(
                "LCP_COMMAND_BASE_DELAY_SECS",
                defaults.command_base_delay_secs,
            ),
            command_max_retries: env_parse("LCP_COMMAND_MAX_RETRIES", defaults.command_max_retries),
            command_retention_days: env_parse(
                "LCP_COMMAND_RETENTION_DAYS",
                defaults.command_retention_days,
            ),
        }
    }

    /// Reject configurations with negative durations or empty buckets — the
    /// validation errors the config loader must surface.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Validation`] describing the first invalid field.
    pub fn validate(&self) -> Result<(), LockerError> {
        if let Some(hours) = self.auto_release_hours {
            if hours <= 0.0 {
                return Err(LockerError::Validation {
                    reason: "auto_release_hours must be positive when set".to_owned(),
                });
            }
        }
        if self.reserve_ttl_seconds == 0 {
            return Err(LockerError::Validation {
                reason: "reserve_ttl_seconds must be positive".to_owned(),
            });
        }
        if self.offline_threshold_seconds == 0 {
            return Err(LockerError::Validation {
                reason: "offline_threshold_seconds must be positive".to_owned(),
            });
        }
        if self.cleanup_interval_ms == 0 {
            return Err(LockerError::Validation {
                reason: "cleanup_interval_ms must be positive".to_owned(),
            });
        }
        for (name, bucket) in [
            ("ip", self.rate_limit_ip),
            ("card", self.rate_limit_card),
            ("locker", self.rate_limit_locker),
            ("device", self.rate_limit_device),
        ] {
            if bucket.max_tokens <= 0.0 || bucket.refill_rate <= 0.0 {
                return Err(LockerError::Validation {
                    reason: format!("rate_limits.{name} must have positive max_tokens and refill_rate"),
                });
            }
        }
        if self.command_max_retries <= 0 {
            return Err(LockerError::Validation {
                reason: "command_max_retries must be positive".to_owned(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        CoreConfig::default().validate().unwrap();
    }

    #[test]
    fn non_positive_auto_release_hours_rejected() {
        let config = CoreConfig { auto_release_hours: Some(0.0), ..CoreConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_cleanup_interval_rejected() {
        let config = CoreConfig { cleanup_interval_ms: 0, ..CoreConfig::default() };
        assert!(config.validate().is_err());
    }
}
