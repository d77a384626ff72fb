//! HTTP route composition — every handler is a thin shim over a user-flow
//! or command-queue call: check policy, make the domain call, map the
//! result to a response.

pub mod commands;
pub mod kiosk;
pub mod qr;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the full `/kiosks/...` router tree.
#[must_use]
pub fn router() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/kiosks",
        Router::new().merge(kiosk::router()).merge(qr::router()).merge(commands::router()),
    )
}
