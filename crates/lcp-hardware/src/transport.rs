//! The bus port — hides the physical RS-485/Modbus link behind a
//! trait so the executor's pulse/retry/burst logic never changes between a
//! real serial transport and the test double, the same "port behind the
//! domain logic" shape `lcp-storage` and `lcp_core::EventSink` use.

use async_trait::async_trait;

/// A single relay pulse addressed at a Modbus slave.
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    /// Drive the relay for `locker_id` high for `pulse_duration_ms`, then
    /// low, and report whether the slave acknowledged the write.
    ///
    /// Implementations own their own timing; callers never sleep themselves.
    async fn pulse(&self, locker_id: i64, pulse_duration_ms: u64) -> bool;

    /// Whether the transport currently believes the bus is reachable at all
    /// (used by [`crate::executor::HardwareExecutor::get_hardware_status`]).
    async fn is_connected(&self) -> bool;
}

/// A transport that always succeeds and never sleeps — the test-mode double
/// so unit tests exercise executor logic without touching real hardware or
/// blocking on `burst_duration_seconds` timers.
#[derive(Debug)]
pub struct NullTransport {
    pub always_succeeds: bool,
}

impl NullTransport {
    #[must_use]
    pub fn new(always_succeeds: bool) -> Self {
        Self { always_succeeds }
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ModbusTransport for NullTransport {
    async fn pulse(&self, _locker_id: i64, _pulse_duration_ms: u64) -> bool {
        self.always_succeeds
    }

    async fn is_connected(&self) -> bool {
        true
    }
}
