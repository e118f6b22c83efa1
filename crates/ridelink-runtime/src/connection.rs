//! Connection controller
//!
//! Owns the single connection slot of a session. At most one device is ever
//! connecting or connected; a second request is refused rather than queued.
//! The controller is pure state: the session task performs the link calls and
//! reports their outcome back here.

use ridelink_core::{
    ConnectionError, ConnectionState, Device, DeviceId, DeviceProfile, RidelinkResult,
};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, warn};

/// Reply channel of a pending `connect` call
pub type ConnectResponder = oneshot::Sender<RidelinkResult<Device>>;

// ----------------------------------------------------------------------------
// Slot
// ----------------------------------------------------------------------------

struct Attempt {
    id: u64,
    device: Device,
    responder: Option<ConnectResponder>,
    task: Option<JoinHandle<()>>,
}

enum Slot {
    Idle,
    Connecting(Attempt),
    Connected {
        device: Device,
        profile: DeviceProfile,
    },
    Disconnecting {
        device: Device,
    },
}

/// Outcome of `begin`
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectStart {
    /// A new attempt was opened with this id
    Started(u64),
    /// The same device is already connected; nothing to do
    AlreadyConnected(Device),
}

/// Counters for the connection slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    pub attempts: u64,
    pub connected: u64,
    pub failed: u64,
    pub aborted: u64,
    pub link_lost: u64,
}

// ----------------------------------------------------------------------------
// Connection Controller
// ----------------------------------------------------------------------------

/// Single-slot connection state machine
pub struct ConnectionController {
    slot: Slot,
    next_attempt: u64,
    stats: ConnectionStats,
}

impl Default for ConnectionController {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionController {
    pub fn new() -> Self {
        Self {
            slot: Slot::Idle,
            next_attempt: 1,
            stats: ConnectionStats::default(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match &self.slot {
            Slot::Idle => ConnectionState::Disconnected,
            Slot::Connecting(_) => ConnectionState::Connecting,
            Slot::Connected { .. } => ConnectionState::Connected,
            Slot::Disconnecting { .. } => ConnectionState::Disconnecting,
        }
    }

    pub fn stats(&self) -> ConnectionStats {
        self.stats
    }

    /// Device occupying the slot, whatever its state
    pub fn active_device(&self) -> Option<&Device> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Connecting(attempt) => Some(&attempt.device),
            Slot::Connected { device, .. } | Slot::Disconnecting { device } => Some(device),
        }
    }

    pub fn connected_device(&self) -> Option<&Device> {
        match &self.slot {
            Slot::Connected { device, .. } => Some(device),
            _ => None,
        }
    }

    pub fn connected_profile(&self) -> Option<&DeviceProfile> {
        match &self.slot {
            Slot::Connected { profile, .. } => Some(profile),
            _ => None,
        }
    }

    pub fn is_connected_to(&self, id: &DeviceId) -> bool {
        self.connected_device().is_some_and(|d| &d.id == id)
    }

    /// Open a connection attempt for `device`
    pub fn begin(&mut self, mut device: Device) -> Result<ConnectStart, ConnectionError> {
        match &self.slot {
            Slot::Idle => {}
            Slot::Connected { device: current, .. } if current.id == device.id => {
                return Ok(ConnectStart::AlreadyConnected(current.clone()));
            }
            _ => {
                let active = self
                    .active_device()
                    .map(|d| d.id.clone())
                    .unwrap_or_else(|| device.id.clone());
                return Err(ConnectionError::AlreadyConnecting { active });
            }
        }

        Self::transition(&mut device, ConnectionState::Connecting);
        let id = self.next_attempt;
        self.next_attempt += 1;
        self.stats.attempts += 1;
        self.slot = Slot::Connecting(Attempt {
            id,
            device,
            responder: None,
            task: None,
        });
        Ok(ConnectStart::Started(id))
    }

    /// Attach the spawned link call and the caller's reply channel
    pub fn attach(&mut self, attempt: u64, task: JoinHandle<()>, responder: ConnectResponder) {
        match &mut self.slot {
            Slot::Connecting(current) if current.id == attempt => {
                current.task = Some(task);
                current.responder = Some(responder);
            }
            _ => {
                warn!(attempt, "Attempt no longer pending, aborting link call");
                task.abort();
                drop(responder);
            }
        }
    }

    /// Resolve an attempt with the link's answer
    ///
    /// Returns `None` for a stale attempt id (already aborted).
    pub fn complete(
        &mut self,
        attempt: u64,
        result: Result<DeviceProfile, ConnectionError>,
    ) -> Option<(Option<ConnectResponder>, Result<Device, ConnectionError>)> {
        if !matches!(&self.slot, Slot::Connecting(current) if current.id == attempt) {
            debug!(attempt, "Ignoring stale connection attempt");
            return None;
        }
        let Slot::Connecting(mut attempt) = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return None;
        };
        let responder = attempt.responder.take();
        let mut device = attempt.device;

        match result {
            Ok(profile) => {
                Self::transition(&mut device, ConnectionState::Connected);
                device.capabilities = profile.channels();
                if profile.firmware.is_some() {
                    device.firmware = profile.firmware;
                }
                self.stats.connected += 1;
                self.slot = Slot::Connected {
                    device: device.clone(),
                    profile,
                };
                Some((responder, Ok(device)))
            }
            Err(error) => {
                Self::transition(&mut device, ConnectionState::Error);
                Self::transition(&mut device, ConnectionState::Disconnected);
                self.stats.failed += 1;
                Some((responder, Err(error)))
            }
        }
    }

    /// Cancel an in-flight attempt
    pub fn abort(&mut self) -> Option<(Device, Option<ConnectResponder>)> {
        if !matches!(self.slot, Slot::Connecting(_)) {
            return None;
        }
        let Slot::Connecting(mut attempt) = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return None;
        };
        if let Some(task) = attempt.task.take() {
            task.abort();
        }
        Self::transition(&mut attempt.device, ConnectionState::Disconnected);
        self.stats.aborted += 1;
        Some((attempt.device, attempt.responder.take()))
    }

    /// Move a connected device to `Disconnecting`
    pub fn begin_disconnect(&mut self) -> Option<Device> {
        if !matches!(self.slot, Slot::Connected { .. }) {
            return None;
        }
        let Slot::Connected { mut device, .. } = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return None;
        };
        Self::transition(&mut device, ConnectionState::Disconnecting);
        self.slot = Slot::Disconnecting {
            device: device.clone(),
        };
        Some(device)
    }

    /// Release the slot after the link disconnect returned
    pub fn finish_disconnect(&mut self) -> Option<Device> {
        if !matches!(self.slot, Slot::Disconnecting { .. }) {
            return None;
        }
        let Slot::Disconnecting { mut device } = std::mem::replace(&mut self.slot, Slot::Idle) else {
            return None;
        };
        Self::transition(&mut device, ConnectionState::Disconnected);
        Some(device)
    }

    /// The link dropped without being asked to
    pub fn link_lost(&mut self, id: &DeviceId) -> Option<Device> {
        let matches_slot = match &self.slot {
            Slot::Connected { device, .. } | Slot::Disconnecting { device } => &device.id == id,
            _ => false,
        };
        if !matches_slot {
            return None;
        }
        let mut device = match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Connected { device, .. } | Slot::Disconnecting { device } => device,
            _ => return None,
        };
        Self::transition(&mut device, ConnectionState::Disconnected);
        self.stats.link_lost += 1;
        Some(device)
    }

    fn transition(device: &mut Device, next: ConnectionState) {
        let current = device.connection_state;
        if !current.can_transition_to(next) {
            warn!(
                device = %device.id,
                from = %current,
                to = %next,
                "Unexpected connection state transition"
            );
        }
        debug!(device = %device.id, from = %current, to = %next, "Connection state");
        device.connection_state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridelink_core::{Channel, FeatureMask, FirmwareIdentity};
    use std::time::Duration;

    fn device(id: &str) -> Device {
        Device::new(DeviceId::new(id), id, id)
    }

    fn profile(id: &str) -> DeviceProfile {
        DeviceProfile::new(DeviceId::new(id))
            .with_characteristic(FeatureMask::ACCELERATION)
            .with_characteristic(FeatureMask::ANGULAR_RATE)
            .with_firmware(FirmwareIdentity {
                device_type: 0x06,
                firmware_id: 0x0D,
            })
    }

    #[test]
    fn test_connect_success() {
        let mut controller = ConnectionController::new();
        let ConnectStart::Started(attempt) = controller.begin(device("01")).unwrap() else {
            panic!("expected a new attempt");
        };
        assert_eq!(controller.state(), ConnectionState::Connecting);

        let (_, result) = controller.complete(attempt, Ok(profile("01"))).unwrap();
        let connected = result.unwrap();
        assert_eq!(connected.connection_state, ConnectionState::Connected);
        assert!(connected.supports(Channel::AngularRate));
        assert_eq!(connected.firmware.unwrap().firmware_id, 0x0D);
        assert!(controller.is_connected_to(&DeviceId::new("01")));
    }

    #[test]
    fn test_single_slot() {
        let mut controller = ConnectionController::new();
        controller.begin(device("01")).unwrap();
        assert_eq!(
            controller.begin(device("01")),
            Err(ConnectionError::AlreadyConnecting {
                active: DeviceId::new("01")
            })
        );
        assert_eq!(
            controller.begin(device("02")),
            Err(ConnectionError::AlreadyConnecting {
                active: DeviceId::new("01")
            })
        );
    }

    #[test]
    fn test_connect_same_device_is_noop() {
        let mut controller = ConnectionController::new();
        controller.begin(device("01")).unwrap();
        controller.complete(1, Ok(profile("01")));
        assert!(matches!(
            controller.begin(device("01")),
            Ok(ConnectStart::AlreadyConnected(_))
        ));
        assert!(controller.begin(device("02")).is_err());
    }

    #[test]
    fn test_failure_frees_slot() {
        let mut controller = ConnectionController::new();
        controller.begin(device("01")).unwrap();
        let error = ConnectionError::Timeout {
            device: DeviceId::new("01"),
            timeout: Duration::from_secs(1),
        };
        let (_, result) = controller.complete(1, Err(error.clone())).unwrap();
        assert_eq!(result, Err(error));
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert_eq!(controller.stats().failed, 1);
        assert!(controller.begin(device("02")).is_ok());
    }

    #[test]
    fn test_stale_completion_ignored() {
        let mut controller = ConnectionController::new();
        controller.begin(device("01")).unwrap();
        let (aborted, _) = controller.abort().unwrap();
        assert_eq!(aborted.connection_state, ConnectionState::Disconnected);
        assert!(controller.complete(1, Ok(profile("01"))).is_none());
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_sequence() {
        let mut controller = ConnectionController::new();
        assert!(controller.begin_disconnect().is_none());
        controller.begin(device("01")).unwrap();
        controller.complete(1, Ok(profile("01")));

        let leaving = controller.begin_disconnect().unwrap();
        assert_eq!(leaving.connection_state, ConnectionState::Disconnecting);
        let gone = controller.finish_disconnect().unwrap();
        assert_eq!(gone.connection_state, ConnectionState::Disconnected);
        assert!(controller.finish_disconnect().is_none());
    }

    #[test]
    fn test_link_lost() {
        let mut controller = ConnectionController::new();
        controller.begin(device("01")).unwrap();
        controller.complete(1, Ok(profile("01")));
        assert!(controller.link_lost(&DeviceId::new("02")).is_none());
        assert!(controller.link_lost(&DeviceId::new("01")).is_some());
        assert_eq!(controller.stats().link_lost, 1);
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }
}
