//! Error types for the ride telemetry gateway
//!
//! One enum per concern, unified by [`RidelinkError`]. Per-sample decode
//! failures are swallowed by the router; everything else is surfaced to the
//! caller.

use std::time::Duration;

use thiserror::Error;

use crate::feature::{Channel, FeatureMask};
use crate::types::DeviceId;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Scanning could not be started or stopped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DiscoveryError {
    #[error("Failed to start scan: {reason}")]
    ScanFailed { reason: String },
}

/// Connection attempt failures, reported to the caller without retry
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConnectionError {
    #[error("Connection rejected by {device}: {reason}")]
    Rejected { device: DeviceId, reason: String },
    #[error("Connection to {device} timed out after {timeout:?}")]
    Timeout { device: DeviceId, timeout: Duration },
    #[error("Another connection is already active or in progress ({active})")]
    AlreadyConnecting { active: DeviceId },
    #[error("Device {device} has not been discovered")]
    UnknownDevice { device: DeviceId },
    #[error("Connection attempt to {device} was aborted")]
    Aborted { device: DeviceId },
}

impl ConnectionError {
    /// Device the failure refers to
    pub fn device(&self) -> &DeviceId {
        match self {
            ConnectionError::Rejected { device, .. }
            | ConnectionError::Timeout { device, .. }
            | ConnectionError::UnknownDevice { device }
            | ConnectionError::Aborted { device } => device,
            ConnectionError::AlreadyConnecting { active } => active,
        }
    }
}

/// Channel subscription failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriptionError {
    #[error("Device {device} is not connected")]
    NotConnected { device: DeviceId },
    #[error("Device {device} does not expose channel {channel}")]
    UnsupportedChannel { device: DeviceId, channel: Channel },
    #[error("Link rejected subscription to {channel}: {reason}")]
    Link { channel: Channel, reason: String },
}

/// Malformed notification frames
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Frame has wrong length: expected {expected} bytes, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("Frame tag {mask} does not carry the requested channel")]
    InvalidChannelTag { mask: FeatureMask },
    #[error("{channel} value {value} exceeds full scale")]
    OutOfRange { channel: Channel, value: i16 },
    #[error("Characteristic {uuid} is not a feature characteristic")]
    UnknownCharacteristic { uuid: String },
}

/// Firmware catalog failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CatalogError {
    #[error("Catalog unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("Malformed catalog: {reason}")]
    Malformed { reason: String },
    #[error("No compatible firmware entry for device 0x{device_id:02X} firmware 0x{firmware_id:02X}")]
    Mismatch { device_id: u8, firmware_id: u8 },
}

/// Ride session misuse and integrity failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("A ride is already recording")]
    AlreadyRecording,
    #[error("No ride is recording")]
    NotRecording,
    #[error("Aggregate for {channel} holds {aggregated} samples but {accepted} were accepted")]
    InconsistentAggregate {
        channel: Channel,
        aggregated: u64,
        accepted: u64,
    },
}

/// Errors raised by a link-layer adapter
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LinkError {
    #[error("Link adapter unavailable: {0}")]
    AdapterUnavailable(String),
    #[error("Device not found on link: {0}")]
    DeviceNotFound(DeviceId),
    #[error("Link operation failed: {0}")]
    Operation(String),
    #[error("Link event channel already attached")]
    AlreadyAttached,
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Umbrella error for the gateway
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RidelinkError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },
    #[error("Runtime channel closed: {channel}")]
    ChannelClosed { channel: &'static str },
    #[error("Ride sink failed: {reason}")]
    Sink { reason: String },
}

impl RidelinkError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn channel_closed(channel: &'static str) -> Self {
        Self::ChannelClosed { channel }
    }
}

/// Result type for gateway operations
pub type RidelinkResult<T> = std::result::Result<T, RidelinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: RidelinkError = SessionError::NotRecording.into();
        assert!(matches!(err, RidelinkError::Session(SessionError::NotRecording)));

        let err: RidelinkError = ConnectionError::Timeout {
            device: DeviceId::new("BOX-01"),
            timeout: Duration::from_secs(5),
        }
        .into();
        assert_eq!(err.to_string(), "Connection to BOX-01 timed out after 5s");
    }

    #[test]
    fn test_error_messages() {
        let err = DecodeError::WrongLength {
            expected: 8,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "Frame has wrong length: expected 8 bytes, got 7"
        );
        let err = CatalogError::Mismatch {
            device_id: 0x0A,
            firmware_id: 0x0D,
        };
        assert!(err.to_string().contains("0x0A"));
    }
}
