//! Mock Link for Testing
//!
//! Provides a deterministic in-memory link adapter for testing without radio
//! hardware. Devices are scripted up front; tests then drive sightings, link
//! drops and notifications by hand and inspect every call the runtime made.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use ridelink_core::{
    Device, DeviceId, DeviceProfile, FeatureMask, FirmwareIdentity, Frame, LinkAdapter,
    LinkError, LinkEvent, LinkEventSender,
};
use tokio::sync::{mpsc::error::TrySendError, RwLock};
use tracing::{debug, warn};

/// Board id advertised by SensorTile.box PRO class devices
pub const SENSOR_BOX_DEVICE_TYPE: u8 = 0x0A;

/// Firmware id of the BlueST sensors firmware
pub const SENSOR_BOX_FIRMWARE_ID: u8 = 0x0D;

// ----------------------------------------------------------------------------
// Mock Link Configuration
// ----------------------------------------------------------------------------

/// Configuration for mock link behavior
#[derive(Debug, Clone)]
pub struct MockLinkConfig {
    /// Delay before an accepted connect returns
    pub connect_latency: Duration,
    /// Fraction of notifications silently lost (0.0 = none, 1.0 = all)
    pub notification_loss_rate: f64,
    /// Fraction of notifications truncated by one byte
    pub corruption_rate: f64,
}

impl Default for MockLinkConfig {
    fn default() -> Self {
        Self {
            connect_latency: Duration::from_millis(20),
            notification_loss_rate: 0.0,
            corruption_rate: 0.0,
        }
    }
}

impl MockLinkConfig {
    /// Instant connects, nothing lost
    pub fn ideal() -> Self {
        Self {
            connect_latency: Duration::ZERO,
            notification_loss_rate: 0.0,
            corruption_rate: 0.0,
        }
    }

    /// Radio noise typical of a phone in a backpack
    pub fn lossy() -> Self {
        Self {
            connect_latency: Duration::from_millis(300),
            notification_loss_rate: 0.05,
            corruption_rate: 0.01,
        }
    }
}

// ----------------------------------------------------------------------------
// Scripted Devices
// ----------------------------------------------------------------------------

/// How a scripted device answers a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectBehavior {
    Accept,
    Reject(String),
    /// Never answers; the caller's timeout decides
    Hang,
}

/// A device known to the mock link
#[derive(Debug, Clone)]
pub struct MockDevice {
    pub device: Device,
    pub profile: DeviceProfile,
    pub behavior: ConnectBehavior,
}

impl MockDevice {
    pub fn new(device: Device, profile: DeviceProfile) -> Self {
        Self {
            device,
            profile,
            behavior: ConnectBehavior::Accept,
        }
    }

    /// A sensor box with separate acceleration and angular-rate characteristics
    pub fn sensor_box(id: &str, name: &str) -> Self {
        Self::with_characteristics(
            id,
            name,
            &[FeatureMask::ACCELERATION, FeatureMask::ANGULAR_RATE],
        )
    }

    /// A sensor box streaming all three channels on one characteristic
    pub fn combined_box(id: &str, name: &str) -> Self {
        Self::with_characteristics(id, name, &[FeatureMask::INERTIAL])
    }

    fn with_characteristics(id: &str, name: &str, masks: &[FeatureMask]) -> Self {
        let firmware = FirmwareIdentity {
            device_type: SENSOR_BOX_DEVICE_TYPE,
            firmware_id: SENSOR_BOX_FIRMWARE_ID,
        };
        let profile = masks.iter().fold(
            DeviceProfile::new(DeviceId::new(id)).with_firmware(firmware),
            |profile, mask| profile.with_characteristic(*mask),
        );
        let device = Device::new(DeviceId::new(id), name, id)
            .with_firmware(firmware)
            .with_capabilities(profile.channels())
            .with_rssi(-60);
        Self::new(device, profile)
    }

    pub fn with_behavior(mut self, behavior: ConnectBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn id(&self) -> &DeviceId {
        &self.device.id
    }
}

/// A call the runtime made on the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    Subscribe(DeviceId, FeatureMask),
    Unsubscribe(DeviceId, FeatureMask),
}

#[derive(Debug, Default)]
struct MockState {
    devices: BTreeMap<DeviceId, MockDevice>,
    scanning: bool,
    connected: BTreeSet<DeviceId>,
    subscriptions: BTreeSet<(DeviceId, FeatureMask)>,
    calls: Vec<LinkCall>,
    scan_failure: Option<String>,
    subscribe_failure: Option<String>,
}

/// Counters kept by the mock link
#[derive(Debug, Default)]
pub struct MockLinkStats {
    pub notifications_sent: AtomicU64,
    pub notifications_dropped: AtomicU64,
    pub notifications_corrupted: AtomicU64,
    pub connects_accepted: AtomicU64,
}

// ----------------------------------------------------------------------------
// Mock Link Implementation
// ----------------------------------------------------------------------------

/// Mock link adapter; clones share the same scripted world
#[derive(Clone, Default)]
pub struct MockLink {
    config: MockLinkConfig,
    state: Arc<RwLock<MockState>>,
    events: Arc<std::sync::Mutex<Option<LinkEventSender>>>,
    stats: Arc<MockLinkStats>,
}

impl MockLink {
    pub fn new(config: MockLinkConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Create a mock link with instant, lossless behavior
    pub fn ideal() -> Self {
        Self::new(MockLinkConfig::ideal())
    }

    pub fn stats(&self) -> &MockLinkStats {
        &self.stats
    }

    /// Script a device; it is reported on the next scan
    pub async fn add_device(&self, device: MockDevice) {
        let mut state = self.state.write().await;
        state.devices.insert(device.id().clone(), device);
    }

    pub async fn set_behavior(&self, id: &DeviceId, behavior: ConnectBehavior) {
        if let Some(device) = self.state.write().await.devices.get_mut(id) {
            device.behavior = behavior;
        }
    }

    /// Make the next scans fail, or succeed again with `None`
    pub async fn fail_scan(&self, reason: Option<String>) {
        self.state.write().await.scan_failure = reason;
    }

    pub async fn fail_subscriptions(&self, reason: Option<String>) {
        self.state.write().await.subscribe_failure = reason;
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<LinkCall> {
        self.state.read().await.calls.clone()
    }

    pub async fn subscriptions(&self) -> Vec<(DeviceId, FeatureMask)> {
        self.state.read().await.subscriptions.iter().cloned().collect()
    }

    pub async fn is_subscribed(&self, id: &DeviceId, mask: FeatureMask) -> bool {
        self.state
            .read()
            .await
            .subscriptions
            .contains(&(id.clone(), mask))
    }

    pub async fn is_connected(&self, id: &DeviceId) -> bool {
        self.state.read().await.connected.contains(id)
    }

    pub async fn is_scanning(&self) -> bool {
        self.state.read().await.scanning
    }

    /// Report a sighting of a scripted device
    pub async fn announce(&self, id: &DeviceId) -> bool {
        let device = self
            .state
            .read()
            .await
            .devices
            .get(id)
            .map(|d| d.device.clone());
        match device {
            Some(device) => self.emit(LinkEvent::DeviceFound(device)).await,
            None => false,
        }
    }

    /// Report devices as gone
    pub async fn lose(&self, ids: Vec<DeviceId>) -> bool {
        self.emit(LinkEvent::DevicesLost(ids)).await
    }

    /// Drop a connected link as if the device went out of range
    pub async fn drop_link(&self, id: &DeviceId) -> bool {
        {
            let mut state = self.state.write().await;
            if !state.connected.remove(id) {
                return false;
            }
            state.subscriptions.retain(|(device, _)| device != id);
        }
        self.emit(LinkEvent::Disconnected {
            id: id.clone(),
            reason: "link supervision timeout".to_string(),
        })
        .await
    }

    /// Push a raw payload on the characteristic `mask`
    ///
    /// Nothing is sent unless the characteristic is subscribed.
    pub async fn notify(&self, id: &DeviceId, mask: FeatureMask, mut payload: Vec<u8>) -> bool {
        if !self.is_subscribed(id, mask).await {
            return false;
        }
        if self.config.notification_loss_rate > 0.0
            && fastrand::f64() < self.config.notification_loss_rate
        {
            self.stats
                .notifications_dropped
                .fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.config.corruption_rate > 0.0 && fastrand::f64() < self.config.corruption_rate {
            payload.pop();
            self.stats
                .notifications_corrupted
                .fetch_add(1, Ordering::Relaxed);
        }

        let sent = self
            .emit(LinkEvent::Notification {
                id: id.clone(),
                characteristic: mask.characteristic_uuid(),
                payload,
            })
            .await;
        if sent {
            self.stats.notifications_sent.fetch_add(1, Ordering::Relaxed);
        }
        sent
    }

    /// Push an encoded frame on its own characteristic
    pub async fn notify_frame(&self, id: &DeviceId, frame: &Frame) -> bool {
        self.notify(id, frame.mask, frame.payload.clone()).await
    }

    /// Deliver any link event as-is
    pub async fn inject(&self, event: LinkEvent) -> bool {
        self.emit(event).await
    }

    fn sender(&self) -> Option<LinkEventSender> {
        self.events.lock().ok().and_then(|slot| slot.clone())
    }

    async fn emit(&self, event: LinkEvent) -> bool {
        match self.sender() {
            Some(sender) => sender.send(event).await.is_ok(),
            None => {
                debug!("Mock link: no event channel attached");
                false
            }
        }
    }

    async fn record(&self, call: LinkCall) {
        self.state.write().await.calls.push(call);
    }
}

#[async_trait]
impl LinkAdapter for MockLink {
    async fn start_scan(&self) -> Result<(), LinkError> {
        self.record(LinkCall::StartScan).await;
        let found: Vec<Device> = {
            let mut state = self.state.write().await;
            if let Some(reason) = &state.scan_failure {
                return Err(LinkError::AdapterUnavailable(reason.clone()));
            }
            state.scanning = true;
            state.devices.values().map(|d| d.device.clone()).collect()
        };

        // Queued before returning so sightings follow the scan start in order
        if let Some(sender) = self.sender() {
            for device in found {
                match sender.try_send(LinkEvent::DeviceFound(device)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => warn!("Mock link: event channel full, sighting lost"),
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), LinkError> {
        self.record(LinkCall::StopScan).await;
        self.state.write().await.scanning = false;
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> Result<DeviceProfile, LinkError> {
        self.record(LinkCall::Connect(id.clone())).await;
        let scripted = self
            .state
            .read()
            .await
            .devices
            .get(id)
            .cloned()
            .ok_or_else(|| LinkError::DeviceNotFound(id.clone()))?;

        if !self.config.connect_latency.is_zero() {
            tokio::time::sleep(self.config.connect_latency).await;
        }

        match scripted.behavior {
            ConnectBehavior::Accept => {
                self.state.write().await.connected.insert(id.clone());
                self.stats.connects_accepted.fetch_add(1, Ordering::Relaxed);
                debug!(device = %id, "Mock link: connected");
                Ok(scripted.profile)
            }
            ConnectBehavior::Reject(reason) => Err(LinkError::Operation(reason)),
            ConnectBehavior::Hang => std::future::pending().await,
        }
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), LinkError> {
        self.record(LinkCall::Disconnect(id.clone())).await;
        let mut state = self.state.write().await;
        state.connected.remove(id);
        state.subscriptions.retain(|(device, _)| device != id);
        Ok(())
    }

    async fn subscribe(&self, id: &DeviceId, mask: FeatureMask) -> Result<(), LinkError> {
        self.record(LinkCall::Subscribe(id.clone(), mask)).await;
        let mut state = self.state.write().await;
        if !state.connected.contains(id) {
            return Err(LinkError::DeviceNotFound(id.clone()));
        }
        if let Some(reason) = &state.subscribe_failure {
            return Err(LinkError::Operation(reason.clone()));
        }
        let exposed = state
            .devices
            .get(id)
            .is_some_and(|d| d.profile.characteristics.contains(&mask));
        if !exposed {
            return Err(LinkError::Operation(format!(
                "characteristic {} not exposed",
                mask
            )));
        }
        state.subscriptions.insert((id.clone(), mask));
        Ok(())
    }

    async fn unsubscribe(&self, id: &DeviceId, mask: FeatureMask) -> Result<(), LinkError> {
        self.record(LinkCall::Unsubscribe(id.clone(), mask)).await;
        self.state
            .write()
            .await
            .subscriptions
            .remove(&(id.clone(), mask));
        Ok(())
    }

    fn attach_events(&self, sender: LinkEventSender) -> Result<(), LinkError> {
        let mut slot = self
            .events
            .lock()
            .map_err(|_| LinkError::Operation("event slot poisoned".to_string()))?;
        if slot.is_some() {
            return Err(LinkError::AlreadyAttached);
        }
        *slot = Some(sender);
        Ok(())
    }

    fn adapter_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridelink_core::create_link_event_channel;

    #[tokio::test]
    async fn test_scan_reports_devices() {
        let link = MockLink::ideal();
        link.add_device(MockDevice::sensor_box("AA:01", "BOX-01")).await;
        let (sender, mut receiver) = create_link_event_channel(8);
        link.attach_events(sender).unwrap();

        link.start_scan().await.unwrap();
        match receiver.recv().await {
            Some(LinkEvent::DeviceFound(device)) => assert_eq!(device.name, "BOX-01"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(link.calls().await, vec![LinkCall::StartScan]);
    }

    #[tokio::test]
    async fn test_attach_only_once() {
        let link = MockLink::ideal();
        let (first, _rx1) = create_link_event_channel(1);
        let (second, _rx2) = create_link_event_channel(1);
        link.attach_events(first).unwrap();
        assert_eq!(link.attach_events(second), Err(LinkError::AlreadyAttached));
    }

    #[tokio::test]
    async fn test_notify_requires_subscription() {
        let link = MockLink::ideal();
        let id = DeviceId::new("AA:01");
        link.add_device(MockDevice::sensor_box("AA:01", "BOX-01")).await;
        let (sender, mut receiver) = create_link_event_channel(8);
        link.attach_events(sender).unwrap();

        assert!(!link.notify(&id, FeatureMask::ACCELERATION, vec![0; 8]).await);
        link.connect(&id).await.unwrap();
        link.subscribe(&id, FeatureMask::ACCELERATION).await.unwrap();
        assert!(link.notify(&id, FeatureMask::ACCELERATION, vec![0; 8]).await);
        assert!(matches!(
            receiver.recv().await,
            Some(LinkEvent::Notification { .. })
        ));
    }

    #[tokio::test]
    async fn test_subscribe_unknown_characteristic() {
        let link = MockLink::ideal();
        let id = DeviceId::new("AA:01");
        link.add_device(MockDevice::sensor_box("AA:01", "BOX-01")).await;
        link.connect(&id).await.unwrap();
        assert!(link.subscribe(&id, FeatureMask::MAGNETIC).await.is_err());
    }

    #[tokio::test]
    async fn test_reject_behavior() {
        let link = MockLink::ideal();
        let id = DeviceId::new("AA:01");
        link.add_device(
            MockDevice::sensor_box("AA:01", "BOX-01")
                .with_behavior(ConnectBehavior::Reject("bonding failed".into())),
        )
        .await;
        assert_eq!(
            link.connect(&id).await,
            Err(LinkError::Operation("bonding failed".into()))
        );
        assert!(!link.is_connected(&id).await);
    }

    #[tokio::test]
    async fn test_hang_behavior_never_completes() {
        let link = MockLink::ideal();
        let id = DeviceId::new("AA:01");
        link.add_device(
            MockDevice::sensor_box("AA:01", "BOX-01").with_behavior(ConnectBehavior::Hang),
        )
        .await;

        let mut connect = tokio_test::task::spawn(link.connect(&id));
        tokio_test::assert_pending!(connect.poll());
        tokio_test::assert_pending!(connect.poll());
        drop(connect);
        assert!(!link.is_connected(&id).await);
    }
}
