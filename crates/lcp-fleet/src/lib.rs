//! Fleet services — kiosk heartbeat tracking, the real-time
//! broadcast bus, and RFID selection sessions. `BroadcastBus` implements
//! `lcp_core::StateBroadcaster` so the LSM can publish without this crate
//! creating a dependency cycle.

pub mod bus;
pub mod error;
pub mod heartbeat;
pub mod session;

pub use bus::{BroadcastBus, BusMessage, Envelope, Subscription};
pub use error::FleetError;
pub use heartbeat::{Heartbeat, HeartbeatTracker};
pub use session::{Session, SessionManager, SessionStatus, SharedSessionManager};
