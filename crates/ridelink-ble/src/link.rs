//! btleplug-backed link adapter
//!
//! One background task listens to the adapter's central events for the
//! lifetime of the link. It turns advertisements into `DeviceFound`, reports
//! devices that fell silent as `DevicesLost`, and reports peripherals that
//! dropped on their own as `Disconnected`. Each connected device gets a
//! notification forwarder task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use ridelink_core::{
    Device, DeviceId, DeviceProfile, FeatureMask, LinkAdapter, LinkError, LinkEvent,
    LinkEventSender,
};
use smallvec::SmallVec;
use tokio::sync::{OnceCell, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::BleLinkConfig;
use crate::error::BleLinkError;
use crate::protocol::parse_manufacturer_data;

// ----------------------------------------------------------------------------
// Shared State
// ----------------------------------------------------------------------------

struct Sighting {
    peripheral: PeripheralId,
    device: Device,
    last_seen: Instant,
}

struct Connection {
    peripheral: Peripheral,
    forwarder: JoinHandle<()>,
}

#[derive(Default)]
struct LinkState {
    scanning: bool,
    seen: HashMap<DeviceId, Sighting>,
    connected: HashMap<DeviceId, Connection>,
}

#[derive(Default)]
struct Shared {
    events: std::sync::Mutex<Option<LinkEventSender>>,
    state: RwLock<LinkState>,
}

impl Shared {
    fn sender(&self) -> Option<LinkEventSender> {
        self.events.lock().ok().and_then(|slot| slot.clone())
    }

    async fn emit(&self, event: LinkEvent) {
        if let Some(sender) = self.sender() {
            if sender.send(event).await.is_err() {
                debug!("Link event channel closed");
            }
        }
    }
}

// ----------------------------------------------------------------------------
// BLE Link
// ----------------------------------------------------------------------------

/// Link adapter for BlueST sensor boxes over the host's BLE adapter
pub struct BleLink {
    config: BleLinkConfig,
    adapter: OnceCell<Adapter>,
    shared: Arc<Shared>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl BleLink {
    pub fn new(config: BleLinkConfig) -> Self {
        Self {
            config,
            adapter: OnceCell::new(),
            shared: Arc::new(Shared::default()),
            listener: std::sync::Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BleLinkConfig {
        &self.config
    }

    /// Open the configured adapter and start the central event listener
    async fn adapter(&self) -> Result<&Adapter, BleLinkError> {
        self.adapter
            .get_or_try_init(|| async {
                let manager = Manager::new()
                    .await
                    .map_err(|e| BleLinkError::AdapterNotAvailable(e.to_string()))?;
                let adapters = manager
                    .adapters()
                    .await
                    .map_err(|e| BleLinkError::AdapterNotAvailable(e.to_string()))?;
                let adapter = adapters
                    .into_iter()
                    .nth(self.config.adapter_index)
                    .ok_or_else(|| {
                        BleLinkError::AdapterNotAvailable(format!(
                            "no adapter at index {}",
                            self.config.adapter_index
                        ))
                    })?;

                let events = adapter
                    .events()
                    .await
                    .map_err(|e| BleLinkError::EventStreamFailed(e.to_string()))?;
                let listener = tokio::spawn(listen(
                    adapter.clone(),
                    events,
                    self.config.clone(),
                    Arc::clone(&self.shared),
                ));
                if let Ok(mut slot) = self.listener.lock() {
                    *slot = Some(listener);
                }
                info!(index = self.config.adapter_index, "BLE adapter initialized");
                Ok(adapter)
            })
            .await
    }

    async fn peripheral(&self, id: &DeviceId) -> Result<Peripheral, BleLinkError> {
        let peripheral_id = self
            .shared
            .state
            .read()
            .await
            .seen
            .get(id)
            .map(|s| s.peripheral.clone())
            .ok_or_else(|| BleLinkError::DeviceNotDiscovered(id.clone()))?;
        Ok(self.adapter().await?.peripheral(&peripheral_id).await?)
    }

    async fn connected_peripheral(&self, id: &DeviceId) -> Result<Peripheral, BleLinkError> {
        self.shared
            .state
            .read()
            .await
            .connected
            .get(id)
            .map(|c| c.peripheral.clone())
            .ok_or_else(|| BleLinkError::DeviceNotDiscovered(id.clone()))
    }

    async fn connect_device(&self, id: &DeviceId) -> Result<DeviceProfile, BleLinkError> {
        let peripheral = self.peripheral(id).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| BleLinkError::ConnectionFailed(e.to_string()))?;
        peripheral
            .discover_services()
            .await
            .map_err(|e| BleLinkError::ServiceDiscoveryFailed(e.to_string()))?;

        let masks: SmallVec<[FeatureMask; 4]> = peripheral
            .characteristics()
            .iter()
            .filter_map(|c| FeatureMask::from_characteristic_uuid(&c.uuid))
            .filter(|mask| !mask.channels().is_empty())
            .collect();
        let firmware = self
            .shared
            .state
            .read()
            .await
            .seen
            .get(id)
            .and_then(|s| s.device.firmware);

        let mut profile = DeviceProfile::new(id.clone());
        if let Some(firmware) = firmware {
            profile = profile.with_firmware(firmware);
        }
        for mask in masks {
            profile = profile.with_characteristic(mask);
        }

        let notifications = peripheral
            .notifications()
            .await
            .map_err(|e| BleLinkError::NotificationStreamFailed(e.to_string()))?;
        let forwarder = tokio::spawn(forward_notifications(
            id.clone(),
            notifications,
            Arc::clone(&self.shared),
        ));

        let previous = self.shared.state.write().await.connected.insert(
            id.clone(),
            Connection {
                peripheral,
                forwarder,
            },
        );
        if let Some(previous) = previous {
            previous.forwarder.abort();
        }
        info!(device = %id, characteristics = profile.characteristics.len(), "BLE device connected");
        Ok(profile)
    }

    async fn set_notify(&self, id: &DeviceId, mask: FeatureMask, on: bool) -> Result<(), BleLinkError> {
        let peripheral = self.connected_peripheral(id).await?;
        let uuid = mask.characteristic_uuid();
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| BleLinkError::CharacteristicNotFound {
                characteristic: uuid.to_string(),
            })?;
        let result = if on {
            peripheral.subscribe(&characteristic).await
        } else {
            peripheral.unsubscribe(&characteristic).await
        };
        result.map_err(|e| BleLinkError::SubscriptionFailed(e.to_string()))
    }
}

impl Drop for BleLink {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(listener) = slot.take() {
                listener.abort();
            }
        }
    }
}

#[async_trait]
impl LinkAdapter for BleLink {
    async fn start_scan(&self) -> Result<(), LinkError> {
        let adapter = self.adapter().await?;
        let filter = ScanFilter {
            services: self.config.scan_filter_services.clone(),
        };
        adapter
            .start_scan(filter)
            .await
            .map_err(BleLinkError::from)?;
        self.shared.state.write().await.scanning = true;
        info!("Started BLE scanning");
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), LinkError> {
        self.shared.state.write().await.scanning = false;
        if let Some(adapter) = self.adapter.get() {
            adapter.stop_scan().await.map_err(BleLinkError::from)?;
        }
        info!("Stopped BLE scanning");
        Ok(())
    }

    async fn connect(&self, id: &DeviceId) -> Result<DeviceProfile, LinkError> {
        Ok(self.connect_device(id).await?)
    }

    async fn disconnect(&self, id: &DeviceId) -> Result<(), LinkError> {
        let connection = self.shared.state.write().await.connected.remove(id);
        match connection {
            Some(connection) => {
                connection.forwarder.abort();
                connection
                    .peripheral
                    .disconnect()
                    .await
                    .map_err(BleLinkError::from)?;
                info!(device = %id, "BLE device disconnected");
            }
            None => {
                // Cancels an attempt that has not completed yet
                if let Ok(peripheral) = self.peripheral(id).await {
                    if let Err(error) = peripheral.disconnect().await {
                        debug!(device = %id, %error, "Cancel of pending connect failed");
                    }
                }
            }
        }
        Ok(())
    }

    async fn subscribe(&self, id: &DeviceId, mask: FeatureMask) -> Result<(), LinkError> {
        self.set_notify(id, mask, true).await?;
        debug!(device = %id, characteristic = %mask, "Notifications enabled");
        Ok(())
    }

    async fn unsubscribe(&self, id: &DeviceId, mask: FeatureMask) -> Result<(), LinkError> {
        self.set_notify(id, mask, false).await?;
        debug!(device = %id, characteristic = %mask, "Notifications disabled");
        Ok(())
    }

    fn attach_events(&self, sender: LinkEventSender) -> Result<(), LinkError> {
        let mut slot = self
            .shared
            .events
            .lock()
            .map_err(|_| LinkError::Operation("event slot poisoned".to_string()))?;
        if slot.is_some() {
            return Err(BleLinkError::AlreadyAttached.into());
        }
        *slot = Some(sender);
        Ok(())
    }

    fn adapter_name(&self) -> &'static str {
        "ble"
    }
}

// ----------------------------------------------------------------------------
// Background Tasks
// ----------------------------------------------------------------------------

type CentralEvents = std::pin::Pin<Box<dyn futures::Stream<Item = CentralEvent> + Send>>;
type Notifications =
    std::pin::Pin<Box<dyn futures::Stream<Item = btleplug::api::ValueNotification> + Send>>;

async fn listen(adapter: Adapter, mut events: CentralEvents, config: BleLinkConfig, shared: Arc<Shared>) {
    let sweep_period = (config.lost_after / 2).max(Duration::from_millis(100));
    let mut sweep = tokio::time::interval(sweep_period);

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => handle_central_event(&adapter, event, &config, &shared).await,
                None => {
                    warn!("BLE central event stream ended");
                    break;
                }
            },
            _ = sweep.tick() => sweep_lost(&config, &shared).await,
        }
    }
}

async fn handle_central_event(
    adapter: &Adapter,
    event: CentralEvent,
    config: &BleLinkConfig,
    shared: &Shared,
) {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. } => {
            let Ok(peripheral) = adapter.peripheral(&id).await else {
                return;
            };
            let Ok(Some(properties)) = peripheral.properties().await else {
                return;
            };
            let Some(device) = describe(&id, &properties, config) else {
                return;
            };

            let report = {
                let mut state = shared.state.write().await;
                state.seen.insert(
                    device.id.clone(),
                    Sighting {
                        peripheral: id,
                        device: device.clone(),
                        last_seen: Instant::now(),
                    },
                );
                state.scanning
            };
            if report {
                trace!(device = %device.id, rssi = ?device.rssi, "Advertisement");
                shared.emit(LinkEvent::DeviceFound(device)).await;
            }
        }
        CentralEvent::DeviceDisconnected(peripheral_id) => {
            let dropped = {
                let mut state = shared.state.write().await;
                let id = state
                    .connected
                    .iter()
                    .find(|(_, c)| c.peripheral.id() == peripheral_id)
                    .map(|(id, _)| id.clone());
                id.and_then(|id| state.connected.remove(&id).map(|c| (id, c)))
            };
            if let Some((id, connection)) = dropped {
                connection.forwarder.abort();
                warn!(device = %id, "BLE peripheral disconnected");
                shared
                    .emit(LinkEvent::Disconnected {
                        id,
                        reason: "peripheral disconnected".to_string(),
                    })
                    .await;
            }
        }
        _ => {}
    }
}

/// Report devices that stopped advertising
async fn sweep_lost(config: &BleLinkConfig, shared: &Shared) {
    let lost: Vec<DeviceId> = {
        let mut state = shared.state.write().await;
        if !state.scanning {
            return;
        }
        let LinkState { seen, connected, .. } = &mut *state;
        let stale: Vec<DeviceId> = seen
            .iter()
            .filter(|(id, s)| !connected.contains_key(*id) && s.last_seen.elapsed() > config.lost_after)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            seen.remove(id);
        }
        stale
    };
    if !lost.is_empty() {
        debug!(count = lost.len(), "BLE devices lost");
        shared.emit(LinkEvent::DevicesLost(lost)).await;
    }
}

async fn forward_notifications(id: DeviceId, mut notifications: Notifications, shared: Arc<Shared>) {
    while let Some(notification) = notifications.next().await {
        if FeatureMask::from_characteristic_uuid(&notification.uuid).is_none() {
            continue;
        }
        let Some(sender) = shared.sender() else {
            continue;
        };
        let event = LinkEvent::Notification {
            id: id.clone(),
            characteristic: notification.uuid,
            payload: notification.value,
        };
        if sender.send(event).await.is_err() {
            break;
        }
    }
    debug!(device = %id, "Notification forwarder ended");
}

// ----------------------------------------------------------------------------
// Advertisement Parsing
// ----------------------------------------------------------------------------

/// Build a device from advertised properties, or `None` for foreign devices
fn describe(
    peripheral: &PeripheralId,
    properties: &PeripheralProperties,
    config: &BleLinkConfig,
) -> Option<Device> {
    let name = properties.local_name.clone().unwrap_or_default();
    let advertisement = parse_manufacturer_data(&properties.manufacturer_data, config.company_id);
    let named = !config.name_prefix.is_empty() && name.starts_with(&config.name_prefix);
    if advertisement.is_none() && !named {
        return None;
    }

    let id = device_id(peripheral, properties.address);
    let mut device = Device::new(id, name, properties.address.to_string());
    if let Some(rssi) = properties.rssi {
        device = device.with_rssi(rssi);
    }
    if let Some(adv) = advertisement {
        if let Some(firmware) = adv.firmware() {
            device = device.with_firmware(firmware);
        }
        if let Some(features) = adv.features {
            device = device.with_capabilities(features.channels());
        }
    }
    Some(device)
}

/// The address where the platform exposes one, the opaque peripheral id otherwise
fn device_id(peripheral: &PeripheralId, address: BDAddr) -> DeviceId {
    if address.into_inner() != [0; 6] {
        DeviceId::new(address.to_string())
    } else {
        DeviceId::new(format!("{:?}", peripheral))
    }
}
