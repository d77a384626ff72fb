//! RFID selection sessions — short-lived, in-memory
//! records living only for the process's lifetime. At most one active
//! session per kiosk; guarded by a `tokio::sync::RwLock` over a map, the
//! same in-memory single-writer shape used elsewhere in this workspace.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

/// One RFID selection context.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub kiosk_id: String,
    pub card_id: String,
    pub available_lockers: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub timeout_seconds: u64,
    pub status: SessionStatus,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = (now - self.created_at).num_seconds().max(0) as u64;
        age > self.timeout_seconds
    }
}

/// At-most-one-active-session-per-kiosk manager.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    #[must_use]
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    /// Open a new session bound to `(kiosk_id, card_id)`, cancelling any
    /// prior active session on the same kiosk first.
    pub async fn open(
        &self,
        kiosk_id: &str,
        card_id: &str,
        available_lockers: Vec<i64>,
        timeout_seconds: u64,
    ) -> Session {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            kiosk_id: kiosk_id.to_owned(),
            card_id: card_id.to_owned(),
            available_lockers,
            created_at: Utc::now(),
            timeout_seconds,
            status: SessionStatus::Active,
        };
        let mut sessions = self.sessions.write().await;
        sessions.insert(kiosk_id.to_owned(), session.clone());
        session
    }

    /// The active session for `kiosk_id`, if one exists and hasn't expired.
    pub async fn get_active(&self, kiosk_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(kiosk_id)
            .filter(|s| s.status == SessionStatus::Active && !s.is_expired(Utc::now()))
            .cloned()
    }

    /// Mark the active session on `kiosk_id` completed (a locker was
    /// selected) and remove it.
    pub async fn complete(&self, kiosk_id: &str) -> bool {
        self.resolve(kiosk_id, SessionStatus::Completed).await.is_some()
    }

    /// Cancel the active session on `kiosk_id` without a selection,
    /// returning it so the caller can publish a `session_update` carrying
    /// a cancellation reason.
    pub async fn cancel(&self, kiosk_id: &str) -> Option<Session> {
        self.resolve(kiosk_id, SessionStatus::Cancelled).await
    }

    async fn resolve(&self, kiosk_id: &str, status: SessionStatus) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(kiosk_id).is_some_and(|s| s.status == SessionStatus::Active) {
            let mut session = sessions.remove(kiosk_id)?;
            session.status = status;
            return Some(session);
        }
        None
    }

    /// Periodic sweep: expires and
    /// removes every active session past its `timeout_seconds`. Returns the
    /// expired sessions so the caller can publish `session_update` messages.
    pub async fn sweep_expired(&self) -> Vec<Session> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let expired_keys: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.status == SessionStatus::Active && s.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();

        let mut expired = Vec::with_capacity(expired_keys.len());
        for key in expired_keys {
            if let Some(mut session) = sessions.remove(&key) {
                session.status = SessionStatus::Expired;
                expired.push(session);
            }
        }
        expired
    }
}

/// Shared handle type every user-flow caller holds.
pub type SharedSessionManager = Arc<SessionManager>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opening_a_session_cancels_the_prior_one_on_the_same_kiosk() {
        let mgr = SessionManager::new();
        let first = mgr.open("k1", "card-1", vec![1, 2], 30).await;
        let second = mgr.open("k1", "card-2", vec![1, 2], 30).await;
        assert_ne!(first.id, second.id);
        let active = mgr.get_active("k1").await.unwrap();
        assert_eq!(active.id, second.id);
    }

    #[tokio::test]
    async fn completing_removes_the_session() {
        let mgr = SessionManager::new();
        mgr.open("k1", "card-1", vec![1], 30).await;
        assert!(mgr.complete("k1").await);
        assert!(mgr.get_active("k1").await.is_none());
    }

    #[tokio::test]
    async fn sweep_expired_only_removes_sessions_past_their_timeout() {
        let mgr = SessionManager::new();
        mgr.open("k1", "card-1", vec![1], 0).await;
        mgr.open("k2", "card-2", vec![1], 30).await;
        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let expired = mgr.sweep_expired().await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kiosk_id, "k1");
        assert!(mgr.get_active("k2").await.is_some());
    }
}
