//! Discovery scanner
//!
//! Keeps the visible device set in step with what the link adapter reports.
//! The set only changes on explicit `Found`/`Lost` reports or a reset; the
//! scanner never decides on its own that a device has gone stale.

use std::collections::BTreeMap;

use ridelink_core::{Device, DeviceId, DiscoveryEvent};
use tracing::debug;

// ----------------------------------------------------------------------------
// Discovery Scanner
// ----------------------------------------------------------------------------

/// Visible-device bookkeeping for one session
#[derive(Debug, Default)]
pub struct DiscoveryScanner {
    scanning: bool,
    visible: BTreeMap<DeviceId, Device>,
}

impl DiscoveryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Mark scanning as started; returns `false` if it already was
    pub fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.scanning, true)
    }

    /// Mark scanning as stopped; returns `false` if it already was
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.scanning, false)
    }

    /// Forget every visible device
    pub fn reset(&mut self) -> Option<DiscoveryEvent> {
        if self.visible.is_empty() {
            return None;
        }
        let ids: Vec<DeviceId> = std::mem::take(&mut self.visible).into_keys().collect();
        debug!(count = ids.len(), "Discovery reset");
        Some(DiscoveryEvent::Lost(ids))
    }

    /// Record a sighting; only a new id is announced
    pub fn apply_found(&mut self, device: Device) -> Option<DiscoveryEvent> {
        match self.visible.get_mut(&device.id) {
            Some(known) => {
                known.rssi = device.rssi.or(known.rssi);
                if !device.name.is_empty() {
                    known.name = device.name;
                }
                if device.firmware.is_some() {
                    known.firmware = device.firmware;
                }
                None
            }
            None => {
                debug!(device = %device.id, name = %device.name, "Device discovered");
                self.visible.insert(device.id.clone(), device.clone());
                Some(DiscoveryEvent::Found(device))
            }
        }
    }

    /// Drop devices the link no longer reports; unknown ids are ignored
    pub fn apply_lost(&mut self, ids: Vec<DeviceId>) -> Option<DiscoveryEvent> {
        let removed: Vec<DeviceId> = ids
            .into_iter()
            .filter(|id| self.visible.remove(id).is_some())
            .collect();
        if removed.is_empty() {
            None
        } else {
            Some(DiscoveryEvent::Lost(removed))
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.visible.get(id)
    }

    /// Snapshot of the visible set, ordered by id
    pub fn visible(&self) -> Vec<Device> {
        self.visible.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visible.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> Device {
        Device::new(DeviceId::new(id), format!("BOX-{}", id), id)
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut scanner = DiscoveryScanner::new();
        assert!(scanner.start());
        assert!(!scanner.start());
        assert!(scanner.stop());
        assert!(!scanner.stop());
        assert!(scanner.start());
    }

    #[test]
    fn test_found_announced_once() {
        let mut scanner = DiscoveryScanner::new();
        assert!(matches!(
            scanner.apply_found(device("01")),
            Some(DiscoveryEvent::Found(_))
        ));
        assert_eq!(scanner.apply_found(device("01").with_rssi(-40)), None);
        assert_eq!(scanner.len(), 1);
        assert_eq!(scanner.get(&DeviceId::new("01")).unwrap().rssi, Some(-40));
    }

    #[test]
    fn test_lost_only_reports_known() {
        let mut scanner = DiscoveryScanner::new();
        scanner.apply_found(device("01"));
        assert_eq!(scanner.apply_lost(vec![DeviceId::new("02")]), None);
        assert_eq!(
            scanner.apply_lost(vec![DeviceId::new("01"), DeviceId::new("02")]),
            Some(DiscoveryEvent::Lost(vec![DeviceId::new("01")]))
        );
        assert!(scanner.is_empty());
    }

    #[test]
    fn test_reset_loses_everything() {
        let mut scanner = DiscoveryScanner::new();
        assert_eq!(scanner.reset(), None);
        scanner.apply_found(device("02"));
        scanner.apply_found(device("01"));
        assert_eq!(
            scanner.reset(),
            Some(DiscoveryEvent::Lost(vec![DeviceId::new("01"), DeviceId::new("02")]))
        );
        assert!(scanner.visible().is_empty());
    }
}
