//! Staff command-enqueue route.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use lcp_queue::CommandPayload;
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Build the `/kiosks/{kiosk_id}/commands` router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/{kiosk_id}/commands", post(enqueue_command))
}

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    pub command_id: String,
}

async fn enqueue_command(
    State(state): State<Arc<AppState>>,
    Path(kiosk_id): Path<String>,
    Json(payload): Json<CommandPayload>,
) -> Result<Json<EnqueueResponse>, AppError> {
    let command_id = state.commands.enqueue(&kiosk_id, &payload, None).await?;
    Ok(Json(EnqueueResponse { command_id }))
}
