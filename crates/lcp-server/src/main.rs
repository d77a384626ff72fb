//! Locker control plane server entry point.
//!
//! Bootstraps storage, every domain subsystem, and the command queue, then
//! starts the Axum HTTP server with graceful shutdown. Background sweepers
//! (auto-release, rate-limiter cleanup, session/heartbeat expiry, retention)
//! run alongside the server and are cancelled on shutdown.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use lcp_core::{CoreConfig, LockerStateManager};
use lcp_eventlog::{EventLog, FieldHasher};
use lcp_fleet::{BroadcastBus, HeartbeatTracker, SessionManager};
use lcp_hardware::{HardwareExecutor, HardwareSettings, NullTransport};
use lcp_queue::{CommandQueue, QueueSettings};
use lcp_ratelimit::RateLimiter;
use lcp_userflow::{QrFlow, RfidFlow};

use lcp_server::config::ServerConfig;
use lcp_server::routes;
use lcp_server::state::AppState;

/// Broadcast bus subscriber capacity.
const BROADCAST_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    config.core.validate().context("invalid configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(db_path = %config.db_path, "locker control plane starting");

    let state = build_app_state(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cleanup_interval_ms = state.config.cleanup_interval_ms;

    let session_sweeper_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            session_sweeper_worker(state, cleanup_interval_ms, &mut rx).await;
        })
    };

    let retention_sweeper_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            retention_sweeper_worker(state, &mut rx).await;
        })
    };

    let app = build_router(Arc::clone(&state));

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "locker control plane listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("server error")?;

    info!("waiting for background workers to stop");
    let _ = tokio::time::timeout(Duration::from_secs(10), session_sweeper_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(10), retention_sweeper_handle).await;

    info!("locker control plane stopped");
    Ok(())
}

/// Build the shared application state: storage pool, every domain
/// subsystem in dependency order, and the two user-flow orchestrators.
async fn build_app_state(config: &ServerConfig) -> anyhow::Result<Arc<AppState>> {
    let pool = lcp_storage::open(&config.db_path)
        .await
        .context("failed to open locker database")?;

    let core_config = Arc::new(config.core.clone());

    // A random 32-byte HMAC key for event-log and device-id field hashing.
    // Regenerated on every restart; re-identifying a device across a
    // restart only matters for rate-limit bucket continuity, which is
    // already lost on restart anyway.
    let hmac_key: Vec<u8> = {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(a.as_bytes());
        key.extend_from_slice(b.as_bytes());
        key
    };
    let hasher = FieldHasher::new(hmac_key);

    let event_log = Arc::new(EventLog::new(
        pool.clone(),
        hasher.clone(),
        core_config.event_retention_days,
        core_config.audit_retention_days,
    ));

    let broadcast = Arc::new(BroadcastBus::new(BROADCAST_CAPACITY));

    let lsm = Arc::new(LockerStateManager::new(
        pool.clone(),
        Arc::clone(&event_log) as _,
        Arc::clone(&broadcast) as _,
        Arc::clone(&core_config),
    ));

    let rate_limiter = Arc::new(RateLimiter::new(Arc::clone(&core_config), Arc::clone(&event_log) as _));

    let hardware_settings = HardwareSettings::from_core_config(&core_config);
    let transport = Arc::new(NullTransport::new(true));
    let hardware = Arc::new(HardwareExecutor::spawn(
        transport,
        Arc::clone(&lsm),
        Arc::clone(&event_log) as _,
        hardware_settings,
    ));

    let sessions = Arc::new(SessionManager::new());

    let heartbeats = Arc::new(HeartbeatTracker::new(
        pool.clone(),
        Arc::clone(&event_log) as _,
        core_config.offline_threshold_seconds,
    ));

    let commands = Arc::new(CommandQueue::new(
        pool.clone(),
        QueueSettings {
            base_delay_secs: core_config.command_base_delay_secs,
            default_max_retries: core_config.command_max_retries,
            retention_days: core_config.command_retention_days,
        },
    ));

    let rfid = Arc::new(RfidFlow::new(
        Arc::clone(&lsm),
        Arc::clone(&hardware),
        Arc::clone(&rate_limiter),
        Arc::clone(&sessions),
        Arc::clone(&core_config),
    ));

    let qr = Arc::new(QrFlow::new(
        Arc::clone(&lsm),
        Arc::clone(&hardware),
        Arc::clone(&rate_limiter),
        hasher,
    ));

    Ok(Arc::new(AppState {
        lsm,
        hardware,
        rate_limiter,
        event_log,
        broadcast,
        sessions,
        heartbeats,
        commands,
        rfid,
        qr,
        config: core_config,
    }))
}

/// Build the Axum router with security headers, tracing, and CORS.
fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    routes::router()
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .with_state(state)
}

/// Interval between the auto-release/retention sweeper's ticks.
const RETENTION_SWEEPER_INTERVAL_SECS: u64 = 30;

/// Periodically expires selection sessions and marks kiosks offline. Runs on
/// `cleanup_interval_ms` since both checks are latency-sensitive: a session
/// near its timeout should not sit expired-but-unswept for longer than that.
async fn session_sweeper_worker(
    state: Arc<AppState>,
    cleanup_interval_ms: u64,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(cleanup_interval_ms));
    info!(interval_ms = cleanup_interval_ms, "session sweeper worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_session_sweep_tick(&state).await;
            }
            _ = shutdown.changed() => {
                info!("session sweeper worker shutting down");
                return;
            }
        }
    }
}

async fn run_session_sweep_tick(state: &Arc<AppState>) {
    let expired_sessions = state.sessions.sweep_expired().await;
    if !expired_sessions.is_empty() {
        info!(count = expired_sessions.len(), "expired selection sessions swept");
    }

    match state.heartbeats.sweep_offline().await {
        Ok(offline) if !offline.is_empty() => {
            info!(count = offline.len(), "kiosks marked offline");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "heartbeat sweep failed"),
    }
}

/// Periodically sweeps auto-release reservations and rate-limiter/event-log/
/// command-queue retention — lower-urgency housekeeping on a slower cadence
/// than the session sweeper.
async fn retention_sweeper_worker(state: Arc<AppState>, shutdown: &mut watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(RETENTION_SWEEPER_INTERVAL_SECS));
    info!(interval_secs = RETENTION_SWEEPER_INTERVAL_SECS, "retention sweeper worker started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_retention_sweep_tick(&state).await;
            }
            _ = shutdown.changed() => {
                info!("retention sweeper worker shutting down");
                return;
            }
        }
    }
}

async fn run_retention_sweep_tick(state: &Arc<AppState>) {
    match state.lsm.cleanup_expired_reservations(None).await {
        Ok(released) if released > 0 => info!(released, "auto-released expired reservations"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "auto-release sweep failed"),
    }

    let cleared = state.rate_limiter.cleanup().await;
    if cleared > 0 {
        info!(cleared, "idle rate-limit buckets cleared");
    }

    if let Err(e) = state.event_log.cleanup_old().await {
        tracing::warn!(error = %e, "event log retention sweep failed");
    }

    if let Err(e) = state.commands.cleanup_old().await {
        tracing::warn!(error = %e, "command queue retention sweep failed");
    }
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
