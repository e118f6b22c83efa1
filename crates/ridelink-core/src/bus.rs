//! Typed event bus
//!
//! The session actor is the only publisher. Consumers subscribe to the full
//! [`SessionEvent`] stream or to a filtered view (discovery only, telemetry
//! for one channel). Receivers that fall behind skip the lost events and keep
//! going rather than stalling the publisher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

use crate::catalog::FirmwareEntry;
use crate::codec::Sample;
use crate::errors::{CatalogError, ConnectionError};
use crate::feature::Channel;
use crate::ride::RideRecord;
use crate::types::{Device, DeviceId, Timestamp};

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Changes to the visible device set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DiscoveryEvent {
    Found(Device),
    Lost(Vec<DeviceId>),
}

/// Connection lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    DeviceConnected(Device),
    DeviceDisconnected(Device),
    ConnectionFailed {
        id: DeviceId,
        error: ConnectionError,
    },
}

/// One decoded sample, stamped with its receive time
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub sample: Sample,
    pub received_at: Timestamp,
}

/// Ride lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum RideEvent {
    Started { at: Timestamp },
    Elapsed { seconds: u64, display: String },
    Finished(RideRecord),
}

/// Result of matching a connected device against the firmware catalog
#[derive(Debug, Clone, PartialEq)]
pub enum FirmwareEvent {
    Matched {
        device: DeviceId,
        entry: FirmwareEntry,
    },
    /// No catalog entry for the advertised identity; `error` names the pair
    Mismatch {
        device: DeviceId,
        error: CatalogError,
    },
    /// Catalog could not be fetched; telemetry is unaffected
    CatalogUnavailable { reason: String },
}

/// Everything the session publishes
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Discovery(DiscoveryEvent),
    Connection(ConnectionEvent),
    Telemetry {
        device: DeviceId,
        event: TelemetryEvent,
    },
    Ride(RideEvent),
    Firmware(FirmwareEvent),
}

impl SessionEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            SessionEvent::Discovery(_) => "discovery",
            SessionEvent::Connection(_) => "connection",
            SessionEvent::Telemetry { .. } => "telemetry",
            SessionEvent::Ride(_) => "ride",
            SessionEvent::Firmware(_) => "firmware",
        }
    }
}

// ----------------------------------------------------------------------------
// Bus
// ----------------------------------------------------------------------------

/// Broadcast fan-out of session events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; returns the number of receivers that saw it
    pub fn publish(&self, event: SessionEvent) -> usize {
        // No subscribers is fine
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Every event from now on
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }

    /// Discovery events only
    pub fn discovery(&self) -> DiscoveryReceiver {
        DiscoveryReceiver {
            inner: self.subscribe(),
        }
    }

    /// Telemetry for one channel only
    pub fn telemetry(&self, channel: Channel) -> TelemetryReceiver {
        TelemetryReceiver {
            inner: self.subscribe(),
            channel,
        }
    }
}

// ----------------------------------------------------------------------------
// Receivers
// ----------------------------------------------------------------------------

/// Receiver of the full event stream
///
/// A receiver that falls more than the bus capacity behind loses the oldest
/// queued events, lifecycle events such as `DeviceDisconnected` or
/// `Ride(Finished)` included. [`EventReceiver::skipped`] counts what was lost;
/// a consumer that sees it grow should resync from the runtime status.
#[derive(Debug)]
pub struct EventReceiver {
    inner: broadcast::Receiver<SessionEvent>,
    skipped: u64,
}

impl EventReceiver {
    fn new(inner: broadcast::Receiver<SessionEvent>) -> Self {
        Self { inner, skipped: 0 }
    }

    /// Events lost to lag since this receiver was created
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Next event, or `None` once the bus is closed
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.inner.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event receiver lagged, skipping events");
                    self.skipped += skipped;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking receive; `None` when nothing is queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.inner.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event receiver lagged, skipping events");
                    self.skipped += skipped;
                }
                Err(_) => return None,
            }
        }
    }
}

/// Receiver filtered to discovery events
#[derive(Debug)]
pub struct DiscoveryReceiver {
    inner: EventReceiver,
}

impl DiscoveryReceiver {
    pub async fn recv(&mut self) -> Option<DiscoveryEvent> {
        loop {
            if let SessionEvent::Discovery(event) = self.inner.recv().await? {
                return Some(event);
            }
        }
    }
}

/// Receiver filtered to telemetry of one channel
#[derive(Debug)]
pub struct TelemetryReceiver {
    inner: EventReceiver,
    channel: Channel,
}

impl TelemetryReceiver {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub async fn recv(&mut self) -> Option<(DeviceId, TelemetryEvent)> {
        loop {
            if let SessionEvent::Telemetry { device, event } = self.inner.recv().await? {
                if event.sample.channel == self.channel {
                    return Some((device, event));
                }
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
