//! The Hardware Executor — a single-writer queue in front of the
//! serial bus. Every operation is dispatched to one background task so the
//! bus is never addressed by two callers concurrently; callers submit a job
//! and await a oneshot reply, the same request/response-over-a-channel
//! shape used to serialize a single hardware resource's writes behind one
//! dispatcher task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lcp_core::event_sink::{EventRecord, EventSink};
use lcp_core::{CoreConfig, LockerStateManager};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::error::HardwareError;
use crate::transport::ModbusTransport;

/// Timing and retry parameters for the pulse/burst protocol, taken
/// from [`CoreConfig`] plus the one literal not exposed there: how many
/// immediate retries are attempted before the executor escalates to burst
/// mode.
#[derive(Debug, Clone, Copy)]
pub struct HardwareSettings {
    pub pulse_duration_ms: u64,
    pub burst_duration_seconds: u64,
    pub burst_interval_ms: u64,
    pub command_interval_ms: u64,
    pub pulse_retry_count: u32,
    /// Skip real sleeps between pulses — for use with [`crate::transport::NullTransport`]
    /// in tests, so the queue processor never blocks on hardware timing.
    pub test_mode: bool,
}

impl HardwareSettings {
    #[must_use]
    pub fn from_core_config(config: &CoreConfig) -> Self {
        Self {
            pulse_duration_ms: config.pulse_duration_ms,
            burst_duration_seconds: config.burst_duration_seconds,
            burst_interval_ms: config.burst_interval_ms,
            command_interval_ms: config.command_interval_ms,
            pulse_retry_count: 3,
            test_mode: false,
        }
    }

    #[must_use]
    pub fn test() -> Self {
        Self {
            pulse_duration_ms: 400,
            burst_duration_seconds: 10,
            burst_interval_ms: 2000,
            command_interval_ms: 300,
            pulse_retry_count: 3,
            test_mode: true,
        }
    }
}

/// `bulk_open` result.
#[derive(Debug, Clone, Serialize)]
pub struct BulkOpenResult {
    pub total: usize,
    pub success: usize,
    pub failed_ids: Vec<i64>,
}

/// `get_hardware_status` diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct HardwareStatus {
    pub available: bool,
    pub diagnostics: HardwareDiagnostics,
}

#[derive(Debug, Clone, Serialize)]
pub struct HardwareDiagnostics {
    pub total_pulses: u64,
    pub total_failures: u64,
    pub error_rate: f64,
}

enum Job {
    Open { kiosk_id: String, locker_id: i64, respond_to: oneshot::Sender<bool> },
    BulkOpen {
        kiosk_id: String,
        locker_ids: Vec<i64>,
        interval_ms: u64,
        respond_to: oneshot::Sender<BulkOpenResult>,
    },
    Status { respond_to: oneshot::Sender<HardwareStatus> },
}

/// Handle to the running bus worker. Cloning is cheap (it's a channel
/// handle); every clone submits to the same single-consumer queue.
#[derive(Clone)]
pub struct HardwareExecutor {
    tx: mpsc::Sender<Job>,
}

impl HardwareExecutor {
    /// Spawn the bus worker and return a handle to it. The worker owns the
    /// transport, the counters backing [`Self::get_hardware_status`], and
    /// exclusive access to pulse timing; nothing outside this task ever
    /// calls [`ModbusTransport::pulse`] directly.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn ModbusTransport>,
        lsm: Arc<LockerStateManager>,
        sink: Arc<dyn EventSink>,
        settings: HardwareSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(run_worker(rx, transport, lsm, sink, settings));
        Self { tx }
    }

    /// `open_locker`. Invalid ids (`<= 0`) return `false` immediately
    /// without touching the bus.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::QueueClosed`] if the bus worker has exited.
    pub async fn open_locker(&self, kiosk_id: &str, locker_id: i64) -> Result<bool, HardwareError> {
        if locker_id <= 0 {
            return Ok(false);
        }
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Job::Open { kiosk_id: kiosk_id.to_owned(), locker_id, respond_to })
            .await
            .map_err(|_| HardwareError::QueueClosed)?;
        rx.await.map_err(|_| HardwareError::QueueClosed)
    }

    /// `bulk_open`. Sequentially opens `locker_ids` with `interval_ms`
    /// between each, honoring `exclude_vip` by filtering the caller's list
    /// before submission (the executor has no notion of VIP — that's an LSM
    /// concept the caller resolves via [`LockerStateManager::get_available`]).
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::QueueClosed`] if the bus worker has exited.
    pub async fn bulk_open(
        &self,
        kiosk_id: &str,
        locker_ids: Vec<i64>,
        interval_ms: u64,
    ) -> Result<BulkOpenResult, HardwareError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx
            .send(Job::BulkOpen { kiosk_id: kiosk_id.to_owned(), locker_ids, interval_ms, respond_to })
            .await
            .map_err(|_| HardwareError::QueueClosed)?;
        rx.await.map_err(|_| HardwareError::QueueClosed)
    }

    /// `get_hardware_status`.
    ///
    /// # Errors
    ///
    /// Returns [`HardwareError::QueueClosed`] if the bus worker has exited.
    pub async fn get_hardware_status(&self) -> Result<HardwareStatus, HardwareError> {
        let (respond_to, rx) = oneshot::channel();
        self.tx.send(Job::Status { respond_to }).await.map_err(|_| HardwareError::QueueClosed)?;
        rx.await.map_err(|_| HardwareError::QueueClosed)
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Job>,
    transport: Arc<dyn ModbusTransport>,
    lsm: Arc<LockerStateManager>,
    sink: Arc<dyn EventSink>,
    settings: HardwareSettings,
) {
    let total_pulses = AtomicU64::new(0);
    let total_failures = AtomicU64::new(0);

    while let Some(job) = rx.recv().await {
        match job {
            Job::Open { kiosk_id, locker_id, respond_to } => {
                let ok = pulse_with_retry(
                    &transport,
                    &lsm,
                    &sink,
                    &settings,
                    &kiosk_id,
                    locker_id,
                    &total_pulses,
                    &total_failures,
                )
                .await;
                let _ = respond_to.send(ok);
            }
            Job::BulkOpen { kiosk_id, locker_ids, interval_ms, respond_to } => {
                let total = locker_ids.len();
                let mut success = 0;
                let mut failed_ids = Vec::new();
                for (i, locker_id) in locker_ids.into_iter().enumerate() {
                    if i > 0 && !settings.test_mode {
                        tokio::time::sleep(Duration::from_millis(interval_ms)).await;
                    }
                    let ok = pulse_with_retry(
                        &transport,
                        &lsm,
                        &sink,
                        &settings,
                        &kiosk_id,
                        locker_id,
                        &total_pulses,
                        &total_failures,
                    )
                    .await;
                    if ok {
                        success += 1;
                    } else {
                        failed_ids.push(locker_id);
                    }
                }
                info!(kiosk_id, total, success, failed = failed_ids.len(), "bulk open complete");
                let _ = respond_to.send(BulkOpenResult { total, success, failed_ids });
            }
            Job::Status { respond_to } => {
                let pulses = total_pulses.load(Ordering::Relaxed);
                let failures = total_failures.load(Ordering::Relaxed);
                #[allow(clippy::cast_precision_loss)]
                let error_rate = if pulses == 0 { 0.0 } else { failures as f64 / pulses as f64 };
                let status = HardwareStatus {
                    available: transport.is_connected().await,
                    diagnostics: HardwareDiagnostics {
                        total_pulses: pulses,
                        total_failures: failures,
                        error_rate,
                    },
                };
                let _ = respond_to.send(status);
            }
        }
    }
}

/// Pulse `locker_id` up to `pulse_retry_count` times, spaced by
/// `command_interval_ms`; on exhaustion escalate to burst mode for up to
/// `burst_duration_seconds`, pulsing every `burst_interval_ms`.
#[allow(clippy::too_many_arguments)]
async fn pulse_with_retry(
    transport: &Arc<dyn ModbusTransport>,
    lsm: &Arc<LockerStateManager>,
    sink: &Arc<dyn EventSink>,
    settings: &HardwareSettings,
    kiosk_id: &str,
    locker_id: i64,
    total_pulses: &AtomicU64,
    total_failures: &AtomicU64,
) -> bool {
    let mut attempt_count = 0u32;

    for attempt in 1..=settings.pulse_retry_count {
        attempt_count = attempt;
        total_pulses.fetch_add(1, Ordering::Relaxed);
        if transport.pulse(locker_id, settings.pulse_duration_ms).await {
            on_success(lsm, kiosk_id, locker_id).await;
            return true;
        }
        total_failures.fetch_add(1, Ordering::Relaxed);
        if attempt < settings.pulse_retry_count && !settings.test_mode {
            tokio::time::sleep(Duration::from_millis(settings.command_interval_ms)).await;
        }
    }

    warn!(kiosk_id, locker_id, attempt_count, "pulse retries exhausted, entering burst mode");

    let burst_deadline = Duration::from_secs(settings.burst_duration_seconds);
    let burst_interval = Duration::from_millis(settings.burst_interval_ms);
    let mut elapsed = Duration::ZERO;

    while elapsed < burst_deadline {
        if !settings.test_mode {
            tokio::time::sleep(burst_interval).await;
        }
        elapsed += burst_interval;
        attempt_count += 1;
        total_pulses.fetch_add(1, Ordering::Relaxed);
        if transport.pulse(locker_id, settings.pulse_duration_ms).await {
            on_success(lsm, kiosk_id, locker_id).await;
            return true;
        }
        total_failures.fetch_add(1, Ordering::Relaxed);
    }

    on_failure(lsm, sink, kiosk_id, locker_id, attempt_count).await;
    false
}

async fn on_success(lsm: &Arc<LockerStateManager>, kiosk_id: &str, locker_id: i64) {
    // Closes any pre-existing Error state left over from a prior failed
    // open; a no-op if the locker wasn't in Error.
    match lsm.recover(kiosk_id, locker_id, None).await {
        Ok(_) => {}
        Err(err) => warn!(kiosk_id, locker_id, %err, "failed to clear error state after successful pulse"),
    }
    info!(kiosk_id, locker_id, "pulse succeeded");
}

async fn on_failure(
    lsm: &Arc<LockerStateManager>,
    sink: &Arc<dyn EventSink>,
    kiosk_id: &str,
    locker_id: i64,
    attempt_count: u32,
) {
    sink.record(EventRecord {
        kiosk_id: kiosk_id.to_owned(),
        locker_id: Some(locker_id),
        event_type: "hardware_operation_failed",
        rfid_card: None,
        device_id: None,
        staff_user: None,
        details: serde_json::json!({ "locker_id": locker_id, "error": "bus_timeout", "attempt_count": attempt_count }),
    })
    .await;

    match lsm.mark_hardware_error(kiosk_id, locker_id).await {
        Ok(_) => {}
        Err(err) => warn!(kiosk_id, locker_id, %err, "failed to record hardware error on locker"),
    }
}
