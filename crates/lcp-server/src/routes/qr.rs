//! QR self-service route.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use lcp_userflow::QrOutcome;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/kiosks/{kiosk_id}/lockers/{locker_id}/qr` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{kiosk_id}/lockers/{locker_id}/qr", post(qr_request))
}

#[derive(Debug, Deserialize)]
pub struct QrRequestQuery {
    pub device: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QrResponse {
    Assigned { locker_id: i64 },
    Released { locker_id: i64 },
    HardwareError { locker_id: i64 },
    Denied { message_key: &'static str, params: serde_json::Value },
}

/// Wraps [`QrResponse`] so a `Denied` outcome can drive its own HTTP status
/// (423/409) instead of always answering 200.
struct QrHttpResponse {
    status: StatusCode,
    body: QrResponse,
}

impl From<QrOutcome> for QrHttpResponse {
    fn from(outcome: QrOutcome) -> Self {
        match outcome {
            QrOutcome::Assigned { locker_id } => {
                Self { status: StatusCode::OK, body: QrResponse::Assigned { locker_id } }
            }
            QrOutcome::Released { locker_id } => {
                Self { status: StatusCode::OK, body: QrResponse::Released { locker_id } }
            }
            QrOutcome::HardwareError { locker_id } => {
                Self { status: StatusCode::BAD_GATEWAY, body: QrResponse::HardwareError { locker_id } }
            }
            QrOutcome::Denied { status_code, message_key, params } => Self {
                status: StatusCode::from_u16(status_code).unwrap_or(StatusCode::CONFLICT),
                body: QrResponse::Denied { message_key, params },
            },
        }
    }
}

impl IntoResponse for QrHttpResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn qr_request(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path((kiosk_id, locker_id)): Path<(String, i64)>,
    Query(query): Query<QrRequestQuery>,
) -> Result<QrHttpResponse, AppError> {
    let outcome = state
        .qr
        .handle_qr_request(&kiosk_id, locker_id, &query.device, &addr.ip().to_string())
        .await?;
    Ok(outcome.into())
}
