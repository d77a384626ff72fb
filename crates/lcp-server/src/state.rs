//! Shared application state for the locker control plane server.
//!
//! A single [`AppState`] is constructed at startup and shared across all
//! Axum handlers via `Arc`. It holds every subsystem the user-flow and
//! command-queue routes compose.

use std::sync::Arc;

use lcp_core::{CoreConfig, LockerStateManager};
use lcp_eventlog::EventLog;
use lcp_fleet::{BroadcastBus, HeartbeatTracker, SharedSessionManager};
use lcp_hardware::HardwareExecutor;
use lcp_queue::CommandQueue;
use lcp_ratelimit::RateLimiter;
use lcp_userflow::{QrFlow, RfidFlow};

/// Shared application state passed to all HTTP handlers.
pub struct AppState {
    /// The Locker State Manager.
    pub lsm: Arc<LockerStateManager>,
    /// The Hardware Executor's bus handle.
    pub hardware: Arc<HardwareExecutor>,
    /// The token-bucket rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// The append-only event log.
    pub event_log: Arc<EventLog>,
    /// The real-time broadcast bus.
    pub broadcast: Arc<BroadcastBus>,
    /// RFID selection sessions.
    pub sessions: SharedSessionManager,
    /// Kiosk heartbeat tracker.
    pub heartbeats: Arc<HeartbeatTracker>,
    /// The durable command queue.
    pub commands: Arc<CommandQueue>,
    /// RFID card-scan / locker-selection orchestration.
    pub rfid: Arc<RfidFlow>,
    /// QR request orchestration.
    pub qr: Arc<QrFlow>,
    /// The shared domain configuration.
    pub config: Arc<CoreConfig>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
