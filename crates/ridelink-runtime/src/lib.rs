//! Ridelink Runtime
//!
//! This crate runs one gateway session:
//! - `RuntimeBuilder` / `RuntimeHandle`: the public async API
//! - the session task, the single owner of all session state
//! - discovery scanner, connection controller, subscription manager and
//!   telemetry router, each a plain state machine driven by the task
//!
//! `ridelink-core` provides the data model and the traits; this crate is the
//! engine that drives them.

pub mod builder;
pub mod connection;
pub mod discovery;
pub mod router;
pub mod subscription;
mod task;

pub use builder::{RuntimeBuilder, RuntimeHandle};
pub use connection::{ConnectStart, ConnectionController, ConnectionStats};
pub use discovery::DiscoveryScanner;
pub use router::{RouterStats, TelemetryRouter};
pub use subscription::{DisablePlan, EnablePlan, SubscriptionManager};
pub use task::SessionStatus;

// Re-export core types for convenience
pub use ridelink_core::{
    Channel, ConnectionEvent, ConnectionState, Device, DeviceId, DiscoveryEvent, FirmwareEvent,
    RideEvent, RideRecord, RidelinkError, RidelinkResult, SessionConfig, SessionEvent,
    TelemetryEvent,
};
