//! Error types for the BLE link

use ridelink_core::{DeviceId, LinkError};
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE link
#[derive(Error, Debug)]
pub enum BleLinkError {
    #[error("BLE adapter not available: {0}")]
    AdapterNotAvailable(String),

    #[error("Device not discovered: {0}")]
    DeviceNotDiscovered(DeviceId),

    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: String },

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("Event channel already attached")]
    AlreadyAttached,

    #[error("BLE error: {0}")]
    Btleplug(#[from] btleplug::Error),
}

impl From<BleLinkError> for LinkError {
    fn from(err: BleLinkError) -> Self {
        match err {
            BleLinkError::AdapterNotAvailable(reason) => LinkError::AdapterUnavailable(reason),
            BleLinkError::DeviceNotDiscovered(id) => LinkError::DeviceNotFound(id),
            BleLinkError::AlreadyAttached => LinkError::AlreadyAttached,
            other => LinkError::Operation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_to_link_error() {
        let id = DeviceId::new("AA:01");
        assert_eq!(
            LinkError::from(BleLinkError::DeviceNotDiscovered(id.clone())),
            LinkError::DeviceNotFound(id)
        );
        assert!(matches!(
            LinkError::from(BleLinkError::SubscriptionFailed("gatt".into())),
            LinkError::Operation(reason) if reason.contains("gatt")
        ));
    }
}
