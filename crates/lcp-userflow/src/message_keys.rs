//! Stable message-key contract — `UserFlowOutcome` variants carry one
//! of these keys plus structured params, never a pre-rendered sentence. An
//! external i18n layer resolves the key; this crate never formats English
//! prose for an operator to read.

pub const OPEN_FAILED_CALL_STAFF: &str = "open_failed_call_staff";
pub const NETWORK_ERROR: &str = "network_error";
pub const VIP_LOCKER_QR_DISABLED: &str = "vip_locker_qr_disabled";
pub const RATE_LIMITED: &str = "rate_limited";
pub const TEMPORARILY_BLOCKED: &str = "temporarily_blocked";
pub const LOCKER_CONFLICT: &str = "locker_conflict";
pub const NO_ACTIVE_SESSION: &str = "no_active_session";
pub const LOCKER_NOT_OFFERED: &str = "locker_not_offered";
pub const ALREADY_OWNED_ELSEWHERE: &str = "already_owned_elsewhere";
