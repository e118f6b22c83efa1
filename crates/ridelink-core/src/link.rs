//! Link adapter abstraction
//!
//! The link adapter is the only component that talks to the radio stack. It
//! executes scan, connect and subscribe requests and reports everything it
//! observes as [`LinkEvent`]s on a bounded channel created by the runtime and
//! attached before the session task starts.
//!
//! ## Implementations
//!
//! - `BleLink` in the `ridelink-ble` crate (btleplug)
//! - `MockLink` in the `ridelink-harness` crate (scripted, in-memory)

use async_trait::async_trait;
use smallvec::SmallVec;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::errors::LinkError;
use crate::feature::{Channel, FeatureMask};
use crate::types::{Device, DeviceId, FirmwareIdentity};

// ----------------------------------------------------------------------------
// Link Events
// ----------------------------------------------------------------------------

/// Observations reported by a link adapter
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A device was seen while scanning (first sighting or refresh)
    DeviceFound(Device),
    /// Devices the radio stack no longer reports
    DevicesLost(Vec<DeviceId>),
    /// The link to a connected device dropped without a request
    Disconnected { id: DeviceId, reason: String },
    /// Raw notification on a characteristic
    Notification {
        id: DeviceId,
        characteristic: Uuid,
        payload: Vec<u8>,
    },
}

pub type LinkEventSender = mpsc::Sender<LinkEvent>;
pub type LinkEventReceiver = mpsc::Receiver<LinkEvent>;

/// Create the bounded link event channel
pub fn create_link_event_channel(buffer_size: usize) -> (LinkEventSender, LinkEventReceiver) {
    mpsc::channel(buffer_size.max(1))
}

// ----------------------------------------------------------------------------
// Device Profile
// ----------------------------------------------------------------------------

/// What a device exposes once connected
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub id: DeviceId,
    pub firmware: Option<FirmwareIdentity>,
    /// Feature characteristics able to notify, one mask per characteristic
    pub characteristics: SmallVec<[FeatureMask; 4]>,
}

impl DeviceProfile {
    pub fn new(id: DeviceId) -> Self {
        Self {
            id,
            firmware: None,
            characteristics: SmallVec::new(),
        }
    }

    pub fn with_characteristic(mut self, mask: FeatureMask) -> Self {
        self.characteristics.push(mask);
        self
    }

    pub fn with_firmware(mut self, firmware: FirmwareIdentity) -> Self {
        self.firmware = Some(firmware);
        self
    }

    /// Channels reachable through any characteristic, highest bit first
    pub fn channels(&self) -> SmallVec<[Channel; 4]> {
        let all = self
            .characteristics
            .iter()
            .fold(FeatureMask::EMPTY, |acc, mask| acc.union(*mask));
        all.channels()
    }

    /// Characteristic that should carry `channel`
    ///
    /// A dedicated single-channel characteristic wins over a combined one.
    pub fn characteristic_for(&self, channel: Channel) -> Option<FeatureMask> {
        let mut candidates: SmallVec<[FeatureMask; 4]> = self
            .characteristics
            .iter()
            .copied()
            .filter(|mask| mask.contains(channel.mask()))
            .collect();
        candidates.sort_by_key(|mask| mask.bits().count_ones());
        candidates.first().copied()
    }
}

// ----------------------------------------------------------------------------
// Link Adapter Trait
// ----------------------------------------------------------------------------

/// Link-layer operations used by the session runtime
///
/// All methods take `&self` so one adapter can be shared between the session
/// task and its in-flight connection attempt.
#[async_trait]
pub trait LinkAdapter: Send + Sync {
    /// Begin reporting `DeviceFound`/`DevicesLost`
    async fn start_scan(&self) -> Result<(), LinkError>;

    async fn stop_scan(&self) -> Result<(), LinkError>;

    /// Establish a link and read the device profile
    async fn connect(&self, id: &DeviceId) -> Result<DeviceProfile, LinkError>;

    async fn disconnect(&self, id: &DeviceId) -> Result<(), LinkError>;

    /// Enable notifications on the characteristic identified by `mask`
    async fn subscribe(&self, id: &DeviceId, mask: FeatureMask) -> Result<(), LinkError>;

    async fn unsubscribe(&self, id: &DeviceId, mask: FeatureMask) -> Result<(), LinkError>;

    /// Attach the channel created by the runtime
    ///
    /// Implementations store the sender and use it for every event they
    /// report. Only one channel may be attached.
    fn attach_events(&self, sender: LinkEventSender) -> Result<(), LinkError>;

    fn adapter_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_prefers_dedicated_characteristic() {
        let profile = DeviceProfile::new(DeviceId::new("BOX-01"))
            .with_characteristic(FeatureMask::INERTIAL)
            .with_characteristic(FeatureMask::ANGULAR_RATE);

        assert_eq!(
            profile.characteristic_for(Channel::AngularRate),
            Some(FeatureMask::ANGULAR_RATE)
        );
        assert_eq!(
            profile.characteristic_for(Channel::Acceleration),
            Some(FeatureMask::INERTIAL)
        );
        assert_eq!(profile.channels().len(), 3);
    }

    #[test]
    fn test_profile_without_channel() {
        let profile =
            DeviceProfile::new(DeviceId::new("BOX-01")).with_characteristic(FeatureMask::ACCELERATION);
        assert_eq!(profile.characteristic_for(Channel::Magnetic), None);
    }
}
