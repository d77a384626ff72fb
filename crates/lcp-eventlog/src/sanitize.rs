//! Field sanitization applied before any event reaches storage:
//! IP addresses are hashed, user agents are truncated. The hashing scheme
//! is HMAC-SHA256 keyed by a process-local secret, hex-encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const USER_AGENT_MAX_LEN: usize = 100;

/// Computes `hash_<16hex>` / `anon_<16hex>` suffixes for a sensitive field.
/// Keeping the key in the struct (rather than a free function) means every
/// writer in a process anonymizes the same raw value to the same hash,
/// which is what lets the anonymization sweep and live sanitization agree.
#[derive(Clone)]
pub struct FieldHasher {
    key: Vec<u8>,
}

impl FieldHasher {
    #[must_use]
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Hex-encoded HMAC-SHA256 of `value`, truncated to the first 16 hex
    /// characters — enough entropy to avoid collisions within one kiosk's
    /// event volume without bloating the `details` payload.
    #[must_use]
    pub fn hash(&self, value: &str) -> String {
        #[allow(clippy::unwrap_used)]
        let mut mac = HmacSha256::new_from_slice(&self.key)
            // HMAC-SHA256 accepts any key length per RFC 2104, this never fails.
            .unwrap();
        mac.update(value.as_bytes());
        let full = hex::encode(mac.finalize().into_bytes());
        full[..16].to_owned()
    }

    #[must_use]
    pub fn hashed_ip(&self, ip: &str) -> String {
        format!("hash_{}", self.hash(ip))
    }

    #[must_use]
    pub fn anonymized(&self, value: &str) -> String {
        format!("anon_{}", self.hash(value))
    }
}

/// Truncate a user-agent string to `USER_AGENT_MAX_LEN` characters plus
/// `"..."`, leaving short strings untouched.
#[must_use]
pub fn truncate_user_agent(user_agent: &str) -> String {
    if user_agent.chars().count() <= USER_AGENT_MAX_LEN {
        return user_agent.to_owned();
    }
    let truncated: String = user_agent.chars().take(USER_AGENT_MAX_LEN).collect();
    format!("{truncated}...")
}

/// Rewrite any `ip_address`/`user_agent` fields found in `details` in place.
pub fn sanitize_details(details: &mut serde_json::Value, hasher: &FieldHasher) {
    let Some(obj) = details.as_object_mut() else { return };
    if let Some(ip) = obj.get("ip_address").and_then(|v| v.as_str()).map(str::to_owned) {
        obj.insert("ip_address".to_owned(), serde_json::Value::String(hasher.hashed_ip(&ip)));
    }
    if let Some(ua) = obj.get("user_agent").and_then(|v| v.as_str()).map(str::to_owned) {
        obj.insert("user_agent".to_owned(), serde_json::Value::String(truncate_user_agent(&ua)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_16_hex_chars() {
        let hasher = FieldHasher::new(b"test-key".to_vec());
        let a = hasher.hash("192.168.1.10");
        let b = hasher.hash("192.168.1.10");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_keys_produce_different_hashes() {
        let a = FieldHasher::new(b"key-a".to_vec()).hash("same-input");
        let b = FieldHasher::new(b"key-b".to_vec()).hash("same-input");
        assert_ne!(a, b);
    }

    #[test]
    fn user_agent_truncated_past_100_chars() {
        let long = "x".repeat(150);
        let truncated = truncate_user_agent(&long);
        assert_eq!(truncated.len(), 103);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn short_user_agent_untouched() {
        assert_eq!(truncate_user_agent("curl/8.0"), "curl/8.0");
    }

    #[test]
    fn sanitize_details_rewrites_ip_and_user_agent() {
        let hasher = FieldHasher::new(b"k".to_vec());
        let mut details = serde_json::json!({ "ip_address": "10.0.0.1", "user_agent": "x".repeat(120) });
        sanitize_details(&mut details, &hasher);
        assert!(details["ip_address"].as_str().unwrap().starts_with("hash_"));
        assert!(details["user_agent"].as_str().unwrap().ends_with("..."));
    }
}
