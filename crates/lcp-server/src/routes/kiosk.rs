//! Kiosk reader routes: RFID card-scan and locker-selection.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::routing::post;
use axum::{Json, Router};
use lcp_userflow::RfidOutcome;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/kiosks/{kiosk_id}` reader router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{kiosk_id}/card-scan", post(card_scan))
        .route("/{kiosk_id}/locker-selection", post(locker_selection))
}

#[derive(Debug, Deserialize)]
pub struct CardScanRequest {
    pub card_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LockerSelectionRequest {
    pub card_id: String,
    pub locker_id: i64,
}

/// The wire shape every RFID outcome serializes to: an `action` tag plus
/// whichever fields that action carries.
#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RfidResponse {
    ShowAvailable { available_lockers: Vec<i64> },
    Released { locker_id: i64 },
    Assigned { locker_id: i64 },
    HardwareError { locker_id: i64 },
    Denied { message_key: &'static str, params: serde_json::Value },
}

impl From<RfidOutcome> for RfidResponse {
    fn from(outcome: RfidOutcome) -> Self {
        match outcome {
            RfidOutcome::ShowAvailable { available_lockers } => Self::ShowAvailable { available_lockers },
            RfidOutcome::Released { locker_id } => Self::Released { locker_id },
            RfidOutcome::Assigned { locker_id } => Self::Assigned { locker_id },
            RfidOutcome::HardwareError { locker_id } => Self::HardwareError { locker_id },
            RfidOutcome::Denied { message_key, params } => Self::Denied { message_key, params },
        }
    }
}

async fn card_scan(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(kiosk_id): Path<String>,
    Json(body): Json<CardScanRequest>,
) -> Result<Json<RfidResponse>, AppError> {
    let outcome =
        state.rfid.handle_card_scan(&kiosk_id, &body.card_id, &addr.ip().to_string()).await?;
    Ok(Json(outcome.into()))
}

async fn locker_selection(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<String>,
    Json(body): Json<LockerSelectionRequest>,
) -> Result<Json<RfidResponse>, AppError> {
    let outcome =
        state.rfid.handle_locker_selection(&kiosk_id, &body.card_id, body.locker_id).await?;
    Ok(Json(outcome.into()))
}
