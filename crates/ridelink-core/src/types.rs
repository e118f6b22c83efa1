//! Core types for the ride telemetry gateway
//!
//! This module defines the fundamental types shared by every component,
//! using newtype patterns for identifiers and timestamps.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::feature::Channel;

// ----------------------------------------------------------------------------
// Device Identifier
// ----------------------------------------------------------------------------

/// Stable link-layer identifier of a device
///
/// On most platforms this is the string form of the peripheral id reported by
/// the BLE stack (a MAC address on Linux, a UUID on macOS).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    pub fn now() -> Self {
        let millis = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self(millis)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get duration since another timestamp, saturating at zero
    pub fn duration_since(&self, other: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ----------------------------------------------------------------------------
// Time Source Trait
// ----------------------------------------------------------------------------

/// Trait for providing timestamps
///
/// The runtime reads the clock only through this trait so that tests can
/// drive ride durations deterministically.
pub trait TimeSource: Send + Sync {
    /// Get the current timestamp
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation of TimeSource
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl SystemTimeSource {
    pub fn new() -> Self {
        Self
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for deterministic tests and simulations
#[derive(Debug, Clone, Default)]
pub struct ManualTimeSource {
    millis: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.millis.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Device Model
// ----------------------------------------------------------------------------

/// Connection lifecycle of a single device
///
/// `Error` is terminal for one attempt only and always resolves back to
/// `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
    Error,
}

impl ConnectionState {
    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error)
                | (Connecting, Disconnected)
                | (Connected, Disconnecting)
                | (Connected, Disconnected)
                | (Disconnecting, Disconnected)
                | (Error, Disconnected)
        )
    }

    pub fn state_name(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Error => "Error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.state_name())
    }
}

/// Firmware identity advertised by the device (BlueST device and firmware ids)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FirmwareIdentity {
    /// Board type identifier
    pub device_type: u8,
    /// Firmware identifier running on the board
    pub firmware_id: u8,
}

impl fmt::Display for FirmwareIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dev 0x{:02X} fw 0x{:02X}", self.device_type, self.firmware_id)
    }
}

/// A discoverable telemetry box
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub address: String,
    pub connection_state: ConnectionState,
    pub firmware: Option<FirmwareIdentity>,
    pub capabilities: SmallVec<[Channel; 4]>,
    pub rssi: Option<i16>,
}

impl Device {
    /// Create a freshly discovered, disconnected device
    pub fn new(id: DeviceId, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            connection_state: ConnectionState::Disconnected,
            firmware: None,
            capabilities: SmallVec::new(),
            rssi: None,
        }
    }

    pub fn with_firmware(mut self, firmware: FirmwareIdentity) -> Self {
        self.firmware = Some(firmware);
        self
    }

    pub fn with_capabilities(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.capabilities = channels.into_iter().collect();
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn supports(&self, channel: Channel) -> bool {
        self.capabilities.contains(&channel)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state == ConnectionState::Connected
    }

    /// Match a user-supplied selector against the id or the advertised name
    pub fn matches(&self, selector: &str) -> bool {
        self.id.as_str() == selector || self.name == selector
    }
}

// ----------------------------------------------------------------------------
// Location and Identity
// ----------------------------------------------------------------------------

/// A single coordinate snapshot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Location stamp of a ride record
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Location {
    Known(Coordinate),
    Unknown,
}

impl From<Option<Coordinate>> for Location {
    fn from(coordinate: Option<Coordinate>) -> Self {
        coordinate.map(Location::Known).unwrap_or(Location::Unknown)
    }
}

/// Opaque identity of the rider handed to the ride sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserIdentity(pub String);

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Error));
        assert!(Error.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Disconnecting));

        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Error.can_transition_to(Connected));
        assert!(!Disconnecting.can_transition_to(Connected));
    }

    #[test]
    fn test_manual_time_source() {
        let clock = ManualTimeSource::new(Timestamp::new(1_000));
        let start = clock.now();
        clock.advance(Duration::from_secs(125));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(125));

        let shared = clock.clone();
        shared.advance(Duration::from_millis(1));
        assert_eq!(clock.now().as_millis(), 126_001);
    }

    #[test]
    fn test_device_selector() {
        let device = Device::new(DeviceId::new("AA:BB"), "BOX-01", "AA:BB");
        assert!(device.matches("BOX-01"));
        assert!(device.matches("AA:BB"));
        assert!(!device.matches("BOX-02"));
    }

    #[test]
    fn test_location_from_option() {
        assert_eq!(Location::from(None), Location::Unknown);
        let c = Coordinate {
            latitude: 40.0,
            longitude: -75.0,
        };
        assert_eq!(Location::from(Some(c)), Location::Known(c));
    }
}
