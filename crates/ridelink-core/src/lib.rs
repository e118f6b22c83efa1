//! Ridelink Core
//!
//! Foundational types for the ride telemetry gateway: the device model, the
//! BlueST feature masks and frame codec, the firmware catalog matcher, the
//! ride session state machine, the typed event bus, and the traits behind
//! which the radio stack and outer services live.
//!
//! Nothing in this crate performs I/O; the session runtime drives it.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod bus;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod errors;
pub mod feature;
pub mod link;
pub mod ride;
pub mod services;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use bus::{
    ConnectionEvent, DiscoveryEvent, DiscoveryReceiver, EventBus, EventReceiver, FirmwareEvent,
    RideEvent, SessionEvent, TelemetryEvent, TelemetryReceiver,
};
pub use catalog::{
    match_firmware, Catalog, CatalogService, Environment, FirmwareEntry, StaticCatalogService,
};
pub use codec::{Axes, Frame, FrameCodec, Sample};
pub use config::{ChannelConfig, SessionConfig};
pub use errors::{
    CatalogError, ConnectionError, DecodeError, DiscoveryError, LinkError, RidelinkError,
    RidelinkResult, SessionError, SubscriptionError,
};
pub use feature::{Channel, FeatureMask};
pub use link::{
    create_link_event_channel, DeviceProfile, LinkAdapter, LinkEvent, LinkEventReceiver,
    LinkEventSender,
};
pub use ride::{AggregationPolicy, ChannelAggregate, RideRecord, RideSession, RideState};
pub use services::{FixedLocation, LocationProvider, MemoryRideSink, NoLocation, RideSink};
pub use types::{
    ConnectionState, Coordinate, Device, DeviceId, FirmwareIdentity, Location, ManualTimeSource,
    SystemTimeSource, TimeSource, Timestamp, UserIdentity,
};
