//! Command types and wire-format payloads.

use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// The four command kinds a kiosk can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    OpenLocker,
    BulkOpen,
    BlockLocker,
    UnblockLocker,
}

impl CommandType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenLocker => "open_locker",
            Self::BulkOpen => "bulk_open",
            Self::BlockLocker => "block_locker",
            Self::UnblockLocker => "unblock_locker",
        }
    }

    /// # Errors
    ///
    /// Returns [`QueueError::Validation`] if `raw` isn't a known command type.
    pub fn parse(raw: &str) -> Result<Self, QueueError> {
        match raw {
            "open_locker" => Ok(Self::OpenLocker),
            "bulk_open" => Ok(Self::BulkOpen),
            "block_locker" => Ok(Self::BlockLocker),
            "unblock_locker" => Ok(Self::UnblockLocker),
            other => Err(QueueError::Validation { reason: format!("unknown command type '{other}'") }),
        }
    }
}

/// The payload shapes, keyed by command type. Serializes to the exact
/// `{ open_locker: { .. } }` wire format, since serde's default
/// externally-tagged representation uses the variant name as the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPayload {
    OpenLocker { locker_id: i64, staff_user: Option<String>, reason: Option<String> },
    BulkOpen { locker_ids: Vec<i64>, staff_user: String, exclude_vip: bool, interval_ms: u64 },
    BlockLocker { locker_id: i64, staff_user: String, reason: Option<String> },
    UnblockLocker { locker_id: i64, staff_user: String },
}

impl CommandPayload {
    #[must_use]
    pub fn command_type(&self) -> CommandType {
        match self {
            Self::OpenLocker { .. } => CommandType::OpenLocker,
            Self::BulkOpen { .. } => CommandType::BulkOpen,
            Self::BlockLocker { .. } => CommandType::BlockLocker,
            Self::UnblockLocker { .. } => CommandType::UnblockLocker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_locker_serializes_to_documented_wire_shape() {
        let payload =
            CommandPayload::OpenLocker { locker_id: 3, staff_user: None, reason: None };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["open_locker"]["locker_id"], 3);
    }
}
