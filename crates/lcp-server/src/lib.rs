//! Locker control plane HTTP server.
//!
//! Wires every subsystem crate together behind an Axum router: RFID
//! card-scan/locker-selection, QR self-service, and staff command-enqueue.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
