//! The Locker State Manager — in-process authority over the locker
//! state machine. Every mutation goes through `lcp_storage::lockers::cas_update`;
//! a version mismatch is a logical failure (`Ok(false)`), never an error.

use std::sync::Arc;

use chrono::Utc;
use lcp_storage::lockers::{self, LockerPatch, Patch};
use lcp_storage::SqlitePool;
use tracing::{info, warn};

use crate::broadcast::{StateBroadcaster, StateUpdate};
use crate::config::CoreConfig;
use crate::domain::{Locker, LockerStatus, OwnerType};
use crate::error::LockerError;
use crate::event_sink::{EventRecord, EventSink};

/// In-process authority over the locker state machine.
pub struct LockerStateManager {
    pool: SqlitePool,
    sink: Arc<dyn EventSink>,
    broadcaster: Arc<dyn StateBroadcaster>,
    config: Arc<CoreConfig>,
}

fn assign_event_type(owner_type: OwnerType) -> &'static str {
    match owner_type {
        OwnerType::Rfid => "rfid_assign",
        OwnerType::Device => "qr_assign",
        OwnerType::Vip => "vip_assign",
    }
}

fn release_event_type(owner_type: OwnerType) -> &'static str {
    match owner_type {
        OwnerType::Rfid => "rfid_release",
        OwnerType::Device => "qr_release",
        OwnerType::Vip => "vip_release",
    }
}

impl LockerStateManager {
    #[must_use]
    pub fn new(
        pool: SqlitePool,
        sink: Arc<dyn EventSink>,
        broadcaster: Arc<dyn StateBroadcaster>,
        config: Arc<CoreConfig>,
    ) -> Self {
        Self { pool, sink, broadcaster, config }
    }

    async fn load(&self, kiosk_id: &str, id: i64) -> Result<Locker, LockerError> {
        let row = lockers::get(&self.pool, kiosk_id, id)
            .await?
            .ok_or_else(|| LockerError::NotFound { kiosk_id: kiosk_id.to_owned(), id })?;
        Locker::from_row(row)
    }

    /// Fetch a single locker by id, regardless of its current state — the
    /// read path QR and admin callers need before deciding which of
    /// `assign`/`release`/`staff_block` applies.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] if the locker doesn't exist, or
    /// [`LockerError::Storage`] on a database failure.
    pub async fn get(&self, kiosk_id: &str, id: i64) -> Result<Locker, LockerError> {
        self.load(kiosk_id, id).await
    }

    /// Emit the matching audit event and broadcast for a committed transition.
    /// Invariant 5 requires the broadcast to happen before the caller
    /// observes success, so this runs inline on the commit path.
    async fn announce(&self, updated: &Locker, event_type: &'static str, details: serde_json::Value) {
        self.broadcaster
            .broadcast_state_update(StateUpdate {
                kiosk_id: updated.kiosk_id.clone(),
                locker_id: updated.id,
                state: updated.status,
                owner_key: updated.owner_key.clone(),
                owner_type: updated.owner_type,
                display_name: updated.display_name.clone(),
                is_vip: updated.is_vip,
                last_changed: updated.updated_at,
            })
            .await;

        self.sink
            .record(EventRecord {
                kiosk_id: updated.kiosk_id.clone(),
                locker_id: Some(updated.id),
                event_type,
                rfid_card: (updated.owner_type == Some(OwnerType::Rfid))
                    .then(|| updated.owner_key.clone())
                    .flatten(),
                device_id: (updated.owner_type == Some(OwnerType::Device))
                    .then(|| updated.owner_key.clone())
                    .flatten(),
                staff_user: None,
                details,
            })
            .await;
    }

    /// `assign`. Returns `false` (no error) if the locker wasn't Free,
    /// was VIP, or the owner already holds an active locker elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] if the locker doesn't exist, or
    /// [`LockerError::Storage`] on a database failure.
    pub async fn assign(
        &self,
        kiosk_id: &str,
        id: i64,
        owner_type: OwnerType,
        owner_key: &str,
    ) -> Result<bool, LockerError> {
        if self.check_existing_ownership(owner_key, owner_type).await?.is_some() {
            return Ok(false);
        }

        let current = self.load(kiosk_id, id).await?;
        if current.status != LockerStatus::Free || current.is_vip {
            return Ok(false);
        }

        let patch = LockerPatch {
            status: Some(LockerStatus::Owned.as_str().to_owned()),
            owner_type: Patch::Set(owner_type.as_str().to_owned()),
            owner_key: Patch::Set(owner_key.to_owned()),
            reserved_at: Patch::Set(Utc::now()),
            ..LockerPatch::default()
        };

        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        info!(kiosk_id, locker_id = id, owner_type = owner_type.as_str(), "locker assigned");
        self.announce(&updated, assign_event_type(owner_type), serde_json::json!({})).await;
        Ok(true)
    }

    /// `release`. `true` iff `owner_key` matches the current owner and
    /// the locker was Owned or Opening.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] or [`LockerError::Storage`].
    pub async fn release(&self, kiosk_id: &str, id: i64, owner_key: &str) -> Result<bool, LockerError> {
        let current = self.load(kiosk_id, id).await?;
        if !current.is_active() || current.owner_key.as_deref() != Some(owner_key) {
            return Ok(false);
        }
        let event_type = current.owner_type.map_or("auto_release", release_event_type);
        self.commit_release(current, event_type, serde_json::json!({})).await
    }

    async fn commit_release(
        &self,
        current: Locker,
        event_type: &'static str,
        details: serde_json::Value,
    ) -> Result<bool, LockerError> {
        let patch = LockerPatch {
            status: Some(LockerStatus::Free.as_str().to_owned()),
            owner_type: Patch::Clear,
            owner_key: Patch::Clear,
            reserved_at: Patch::Clear,
            owned_at: Patch::Clear,
            ..LockerPatch::default()
        };
        let Some(row) =
            lockers::cas_update(&self.pool, &current.kiosk_id, current.id, current.version, patch)
                .await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        info!(kiosk_id = %current.kiosk_id, locker_id = current.id, "locker released");
        self.announce(&updated, event_type, details).await;
        Ok(true)
    }

    /// `confirm_opening`. Owned → Opening; records `owned_at`.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] or [`LockerError::Storage`].
    pub async fn confirm_opening(
        &self,
        kiosk_id: &str,
        id: i64,
        owner_key: &str,
    ) -> Result<bool, LockerError> {
        let current = self.load(kiosk_id, id).await?;
        if current.status != LockerStatus::Owned || current.owner_key.as_deref() != Some(owner_key) {
            return Ok(false);
        }

        let patch = LockerPatch {
            status: Some(LockerStatus::Opening.as_str().to_owned()),
            owned_at: Patch::Set(Utc::now()),
            ..LockerPatch::default()
        };
        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        info!(kiosk_id, locker_id = id, "locker opening confirmed");
        self.announce(&updated, "locker_opening_confirmed", serde_json::json!({})).await;
        Ok(true)
    }

    /// Transition Owned or Opening → Error after a hardware failure the
    /// executor could not recover from. Owner fields are cleared to
    /// preserve the invariant that only Owned/Opening states carry an owner.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] or [`LockerError::Storage`].
    pub async fn mark_hardware_error(&self, kiosk_id: &str, id: i64) -> Result<bool, LockerError> {
        let current = self.load(kiosk_id, id).await?;
        if !current.is_active() {
            return Ok(false);
        }

        let patch = LockerPatch {
            status: Some(LockerStatus::Error.as_str().to_owned()),
            owner_type: Patch::Clear,
            owner_key: Patch::Clear,
            ..LockerPatch::default()
        };
        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        warn!(kiosk_id, locker_id = id, "locker entered error state after hardware failure");
        self.announce(&updated, "hardware_operation_failed", serde_json::json!({})).await;
        Ok(true)
    }

    /// `recover`. Error → Free, staff-initiated or automatic after a
    /// clean open.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] or [`LockerError::Storage`].
    pub async fn recover(
        &self,
        kiosk_id: &str,
        id: i64,
        staff_user: Option<&str>,
    ) -> Result<bool, LockerError> {
        let current = self.load(kiosk_id, id).await?;
        if current.status != LockerStatus::Error {
            return Ok(false);
        }

        let patch = LockerPatch { status: Some(LockerStatus::Free.as_str().to_owned()), ..LockerPatch::default() };
        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        info!(kiosk_id, locker_id = id, staff_user, "locker recovered from error");
        let details = staff_user.map_or_else(
            || serde_json::json!({}),
            |user| serde_json::json!({ "staff_user": user }),
        );
        self.announce(&updated, "locker_recovered", details).await;
        Ok(true)
    }

    /// `staff_block`. Free, Owned, or Opening → Blocked.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`], [`LockerError::InvalidTransition`]
    /// if the locker is already Blocked or in Error, or [`LockerError::Storage`].
    pub async fn staff_block(
        &self,
        kiosk_id: &str,
        id: i64,
        staff_user: &str,
        reason: Option<&str>,
    ) -> Result<bool, LockerError> {
        let current = self.load(kiosk_id, id).await?;
        if matches!(current.status, LockerStatus::Blocked | LockerStatus::Error) {
            return Err(LockerError::InvalidTransition {
                reason: format!("locker is {}, cannot block", current.status.as_str()),
            });
        }

        let patch = LockerPatch {
            status: Some(LockerStatus::Blocked.as_str().to_owned()),
            owner_type: Patch::Clear,
            owner_key: Patch::Clear,
            reserved_at: Patch::Clear,
            owned_at: Patch::Clear,
            ..LockerPatch::default()
        };
        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        info!(kiosk_id, locker_id = id, staff_user, "locker blocked");
        self.announce(
            &updated,
            "staff_block",
            serde_json::json!({ "staff_user": staff_user, "reason": reason }),
        )
        .await;
        Ok(true)
    }

    /// `staff_unblock`. Blocked → Free.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`] or [`LockerError::Storage`].
    pub async fn staff_unblock(
        &self,
        kiosk_id: &str,
        id: i64,
        staff_user: &str,
    ) -> Result<bool, LockerError> {
        let current = self.load(kiosk_id, id).await?;
        if current.status != LockerStatus::Blocked {
            return Ok(false);
        }

        let patch = LockerPatch { status: Some(LockerStatus::Free.as_str().to_owned()), ..LockerPatch::default() };
        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        info!(kiosk_id, locker_id = id, staff_user, "locker unblocked");
        self.announce(&updated, "staff_unblock", serde_json::json!({ "staff_user": staff_user })).await;
        Ok(true)
    }

    /// `force_transition`. Staff-only override, bypasses every guard.
    /// Clearing owner fields is required when leaving Owned/Opening, since
    /// only those states may carry an owner; this method refuses to move
    /// *into* Owned/Opening, since it has no owner to assign.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::NotFound`], [`LockerError::Validation`] if
    /// `new_state` is Owned or Opening, or [`LockerError::Storage`].
    pub async fn force_transition(
        &self,
        kiosk_id: &str,
        id: i64,
        new_state: LockerStatus,
        staff_user: &str,
        reason: &str,
    ) -> Result<bool, LockerError> {
        if matches!(new_state, LockerStatus::Owned | LockerStatus::Opening) {
            return Err(LockerError::Validation {
                reason: "force_transition cannot move a locker into Owned or Opening without an owner"
                    .to_owned(),
            });
        }

        let current = self.load(kiosk_id, id).await?;
        let patch = LockerPatch {
            status: Some(new_state.as_str().to_owned()),
            owner_type: Patch::Clear,
            owner_key: Patch::Clear,
            reserved_at: Patch::Clear,
            owned_at: Patch::Clear,
            ..LockerPatch::default()
        };
        let Some(row) = lockers::cas_update(&self.pool, kiosk_id, id, current.version, patch).await?
        else {
            return Ok(false);
        };
        let updated = Locker::from_row(row)?;

        warn!(kiosk_id, locker_id = id, staff_user, new_state = new_state.as_str(), reason, "forced transition");
        self.announce(
            &updated,
            "force_transition",
            serde_json::json!({ "staff_user": staff_user, "reason": reason, "forced_transition": true }),
        )
        .await;
        Ok(true)
    }

    /// `get_available`. Free ∧ ¬VIP, ordered by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Storage`].
    pub async fn get_available(
        &self,
        kiosk_id: &str,
        allowed_ids: Option<&[i64]>,
    ) -> Result<Vec<Locker>, LockerError> {
        let rows = lockers::get_available(&self.pool, kiosk_id, allowed_ids).await?;
        rows.into_iter().map(Locker::from_row).collect()
    }

    /// `get_oldest_available`. Spreads wear across the fleet.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Storage`].
    pub async fn get_oldest_available(
        &self,
        kiosk_id: &str,
        allowed_ids: Option<&[i64]>,
    ) -> Result<Option<Locker>, LockerError> {
        let Some(row) = lockers::get_oldest_available(&self.pool, kiosk_id, allowed_ids).await? else {
            return Ok(None);
        };
        Ok(Some(Locker::from_row(row)?))
    }

    /// `check_existing_ownership`.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Storage`].
    pub async fn check_existing_ownership(
        &self,
        owner_key: &str,
        owner_type: OwnerType,
    ) -> Result<Option<Locker>, LockerError> {
        let Some(row) = lockers::find_active_by_owner(&self.pool, owner_type.as_str(), owner_key).await?
        else {
            return Ok(None);
        };
        Ok(Some(Locker::from_row(row)?))
    }

    /// `validate_ownership`.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Storage`].
    pub async fn validate_ownership(
        &self,
        kiosk_id: &str,
        id: i64,
        owner_key: &str,
        owner_type: OwnerType,
    ) -> Result<bool, LockerError> {
        let Some(row) = lockers::get(&self.pool, kiosk_id, id).await? else {
            return Ok(false);
        };
        let current = Locker::from_row(row)?;
        Ok(current.is_active()
            && current.owner_key.as_deref() == Some(owner_key)
            && current.owner_type == Some(owner_type))
    }

    /// `cleanup_expired_reservations`. Uses `override_hours` if given,
    /// otherwise `config.auto_release_hours`; a `None` deadline (sweeper
    /// disabled) is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Storage`].
    pub async fn cleanup_expired_reservations(
        &self,
        override_hours: Option<f64>,
    ) -> Result<u64, LockerError> {
        let Some(hours) = override_hours.or(self.config.auto_release_hours) else {
            return Ok(0);
        };
        #[allow(clippy::cast_possible_truncation)]
        let cutoff = Utc::now() - chrono::Duration::milliseconds((hours * 3_600_000.0) as i64);

        let expired = lockers::find_expired_reservations(&self.pool, cutoff).await?;
        let mut released = 0u64;
        for row in expired {
            let current = Locker::from_row(row)?;
            let details = serde_json::json!({ "triggered_by": "auto_release" });
            if self.commit_release(current, "auto_release", details).await? {
                released += 1;
            }
        }
        Ok(released)
    }
}
