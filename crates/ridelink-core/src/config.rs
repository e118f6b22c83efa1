//! Session configuration
//!
//! Every tunable of the session runtime lives here so that hosts can load it
//! from files or the environment and tests can use tight presets.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::RidelinkError;
use crate::ride::AggregationPolicy;

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes of the runtime's internal channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Buffer size for commands (handle → session task)
    pub command_buffer_size: usize,
    /// Buffer size for link events (adapter → session task)
    pub link_event_buffer_size: usize,
    /// Capacity of the broadcast event bus
    pub bus_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            link_event_buffer_size: 256, // notifications arrive at sensor rate
            bus_capacity: 1024,
        }
    }
}

impl ChannelConfig {
    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            link_event_buffer_size: 100,
            bus_capacity: 4096,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Configuration for one gateway session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on a single connection attempt
    pub connect_timeout: Duration,
    /// Upper bound on a single enable/disable round trip
    pub subscription_timeout: Duration,
    /// Upper bound on the location snapshot taken when a ride stops
    pub location_timeout: Duration,
    /// Ride elapsed-time tick
    pub tick_interval: Duration,
    /// How ride samples are aggregated
    pub aggregation: AggregationPolicy,
    pub channels: ChannelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            subscription_timeout: Duration::from_secs(5),
            location_timeout: Duration::from_secs(2),
            tick_interval: Duration::from_secs(1),
            aggregation: AggregationPolicy::Series,
            channels: ChannelConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            connect_timeout: Duration::from_millis(500),
            subscription_timeout: Duration::from_millis(500),
            location_timeout: Duration::from_millis(200),
            tick_interval: Duration::from_secs(1),
            aggregation: AggregationPolicy::Series,
            channels: ChannelConfig::testing(),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_subscription_timeout(mut self, timeout: Duration) -> Self {
        self.subscription_timeout = timeout;
        self
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_aggregation(mut self, policy: AggregationPolicy) -> Self {
        self.aggregation = policy;
        self
    }

    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), RidelinkError> {
        if self.connect_timeout.is_zero() {
            return Err(RidelinkError::configuration("Connect timeout cannot be zero"));
        }
        if self.subscription_timeout.is_zero() {
            return Err(RidelinkError::configuration(
                "Subscription timeout cannot be zero",
            ));
        }
        if self.location_timeout.is_zero() {
            return Err(RidelinkError::configuration(
                "Location timeout cannot be zero",
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(RidelinkError::configuration("Tick interval cannot be zero"));
        }
        if self.channels.command_buffer_size == 0 {
            return Err(RidelinkError::configuration(
                "Command buffer size cannot be zero",
            ));
        }
        if self.channels.link_event_buffer_size == 0 {
            return Err(RidelinkError::configuration(
                "Link event buffer size cannot be zero",
            ));
        }
        if self.channels.bus_capacity == 0 {
            return Err(RidelinkError::configuration("Bus capacity cannot be zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(SessionConfig::testing().validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = SessionConfig::default().with_connect_timeout(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(RidelinkError::Configuration { .. })
        ));

        let config = SessionConfig::testing().with_location_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut channels = ChannelConfig::default();
        channels.bus_capacity = 0;
        assert!(SessionConfig::default()
            .with_channels(channels)
            .validate()
            .is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "aggregation": "summary" }"#).unwrap();
        assert_eq!(config.aggregation, AggregationPolicy::Summary);
        assert_eq!(config.tick_interval, Duration::from_secs(1));
    }
}
