//! Shared domain types: `Locker`, `LockerStatus`, `OwnerType`.

use chrono::{DateTime, Utc};
use lcp_storage::lockers::LockerRow;

use crate::error::LockerError;

/// The five locker states. All states are transient; there is no
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum LockerStatus {
    Free,
    Owned,
    Opening,
    Blocked,
    Error,
}

impl LockerStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Owned => "Owned",
            Self::Opening => "Opening",
            Self::Blocked => "Blocked",
            Self::Error => "Error",
        }
    }

    fn parse(raw: &str) -> Result<Self, LockerError> {
        match raw {
            "Free" => Ok(Self::Free),
            "Owned" => Ok(Self::Owned),
            "Opening" => Ok(Self::Opening),
            "Blocked" => Ok(Self::Blocked),
            "Error" => Ok(Self::Error),
            other => Err(LockerError::Validation {
                reason: format!("unknown locker status '{other}'"),
            }),
        }
    }
}

/// Who holds a locker while it's Owned or Opening. `none` from the
/// prose spec is represented as `Option<OwnerType>` being `None` rather than
/// as a fourth variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Rfid,
    Device,
    Vip,
}

impl OwnerType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rfid => "rfid",
            Self::Device => "device",
            Self::Vip => "vip",
        }
    }

    fn parse(raw: &str) -> Result<Self, LockerError> {
        match raw {
            "rfid" => Ok(Self::Rfid),
            "device" => Ok(Self::Device),
            "vip" => Ok(Self::Vip),
            other => Err(LockerError::Validation {
                reason: format!("unknown owner type '{other}'"),
            }),
        }
    }
}

/// The in-process view of a locker row, with `status` and `owner_type`
/// decoded into their enums instead of raw strings.
#[derive(Debug, Clone)]
pub struct Locker {
    pub kiosk_id: String,
    pub id: i64,
    pub status: LockerStatus,
    pub owner_type: Option<OwnerType>,
    pub owner_key: Option<String>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub owned_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub is_vip: bool,
    pub display_name: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Locker {
    /// Decode a storage row into the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`LockerError::Validation`] if `status` or `owner_type` hold a
    /// value outside their known set — a sign of a corrupt row.
    pub fn from_row(row: LockerRow) -> Result<Self, LockerError> {
        let status = LockerStatus::parse(&row.status)?;
        let owner_type = row.owner_type.as_deref().map(OwnerType::parse).transpose()?;
        Ok(Self {
            kiosk_id: row.kiosk_id,
            id: row.id,
            status,
            owner_type,
            owner_key: row.owner_key,
            reserved_at: row.reserved_at,
            owned_at: row.owned_at,
            version: row.version,
            is_vip: row.is_vip,
            display_name: row.display_name,
            updated_at: row.updated_at,
        })
    }

    /// Whether this locker is currently held (Owned or Opening) — tied
    /// directly to `owner_type`/`owner_key` being set.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, LockerStatus::Owned | LockerStatus::Opening)
    }
}
