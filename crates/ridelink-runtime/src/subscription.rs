//! Feature subscription manager
//!
//! Tracks which channels are enabled on the connected device and which
//! characteristic carries each of them. Several channels may share one
//! combined characteristic; the link subscription is opened by the first
//! channel and closed by the last.

use std::collections::BTreeMap;

use ridelink_core::{Channel, Device, DeviceId, DeviceProfile, FeatureMask, SubscriptionError};

// ----------------------------------------------------------------------------
// Plans
// ----------------------------------------------------------------------------

/// What enabling a channel requires from the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnablePlan {
    /// Channel is already enabled
    AlreadyEnabled,
    /// Characteristic is already subscribed for another channel
    Share(FeatureMask),
    /// Characteristic must be subscribed on the link first
    Subscribe(FeatureMask),
}

/// What disabling a channel requires from the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisablePlan {
    /// Channel was not enabled
    NotEnabled,
    /// Other channels still use the characteristic
    Release(FeatureMask),
    /// Last user of the characteristic; unsubscribe on the link
    Unsubscribe(FeatureMask),
}

// ----------------------------------------------------------------------------
// Subscription Manager
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DeviceSubscriptions {
    channels: BTreeMap<Channel, FeatureMask>,
}

impl DeviceSubscriptions {
    fn users_of(&self, mask: FeatureMask) -> usize {
        self.channels.values().filter(|m| **m == mask).count()
    }
}

/// Per-device channel subscriptions
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    devices: BTreeMap<DeviceId, DeviceSubscriptions>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Work out how to enable `channel`; `device` must be the connected one
    pub fn plan_enable(
        &self,
        device: &Device,
        profile: &DeviceProfile,
        channel: Channel,
    ) -> Result<EnablePlan, SubscriptionError> {
        if !device.is_connected() {
            return Err(SubscriptionError::NotConnected {
                device: device.id.clone(),
            });
        }
        let existing = self.devices.get(&device.id);
        if existing.is_some_and(|subs| subs.channels.contains_key(&channel)) {
            return Ok(EnablePlan::AlreadyEnabled);
        }

        let mask = profile
            .characteristic_for(channel)
            .ok_or_else(|| SubscriptionError::UnsupportedChannel {
                device: device.id.clone(),
                channel,
            })?;

        if existing.is_some_and(|subs| subs.users_of(mask) > 0) {
            Ok(EnablePlan::Share(mask))
        } else {
            Ok(EnablePlan::Subscribe(mask))
        }
    }

    /// Record an enabled channel once the link accepted it
    pub fn commit_enable(&mut self, id: &DeviceId, channel: Channel, mask: FeatureMask) {
        self.devices
            .entry(id.clone())
            .or_default()
            .channels
            .insert(channel, mask);
    }

    pub fn plan_disable(&self, id: &DeviceId, channel: Channel) -> DisablePlan {
        let Some(subs) = self.devices.get(id) else {
            return DisablePlan::NotEnabled;
        };
        match subs.channels.get(&channel) {
            None => DisablePlan::NotEnabled,
            Some(mask) if subs.users_of(*mask) > 1 => DisablePlan::Release(*mask),
            Some(mask) => DisablePlan::Unsubscribe(*mask),
        }
    }

    pub fn commit_disable(&mut self, id: &DeviceId, channel: Channel) {
        if let Some(subs) = self.devices.get_mut(id) {
            subs.channels.remove(&channel);
            if subs.channels.is_empty() {
                self.devices.remove(id);
            }
        }
    }

    /// Drop every subscription of a device, returning the characteristics
    /// that were open
    pub fn clear(&mut self, id: &DeviceId) -> Vec<FeatureMask> {
        let mut masks: Vec<FeatureMask> = self
            .devices
            .remove(id)
            .map(|subs| subs.channels.into_values().collect())
            .unwrap_or_default();
        masks.sort();
        masks.dedup();
        masks
    }

    pub fn enabled(&self, id: &DeviceId) -> Vec<Channel> {
        self.devices
            .get(id)
            .map(|subs| subs.channels.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_enabled(&self, id: &DeviceId, channel: Channel) -> bool {
        self.devices
            .get(id)
            .is_some_and(|subs| subs.channels.contains_key(&channel))
    }

    /// Number of open link subscriptions across all devices
    pub fn active_subscriptions(&self) -> usize {
        self.devices
            .values()
            .map(|subs| {
                let mut masks: Vec<FeatureMask> = subs.channels.values().copied().collect();
                masks.sort();
                masks.dedup();
                masks.len()
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridelink_core::ConnectionState;

    fn connected(id: &str) -> Device {
        let mut device = Device::new(DeviceId::new(id), id, id);
        device.connection_state = ConnectionState::Connected;
        device
    }

    fn split_profile(id: &str) -> DeviceProfile {
        DeviceProfile::new(DeviceId::new(id))
            .with_characteristic(FeatureMask::ACCELERATION)
            .with_characteristic(FeatureMask::ANGULAR_RATE)
    }

    #[test]
    fn test_enable_requires_connection() {
        let manager = SubscriptionManager::new();
        let device = Device::new(DeviceId::new("01"), "01", "01");
        assert_eq!(
            manager.plan_enable(&device, &split_profile("01"), Channel::Acceleration),
            Err(SubscriptionError::NotConnected {
                device: DeviceId::new("01")
            })
        );
    }

    #[test]
    fn test_enable_is_idempotent() {
        let mut manager = SubscriptionManager::new();
        let device = connected("01");
        let profile = split_profile("01");

        let plan = manager
            .plan_enable(&device, &profile, Channel::Acceleration)
            .unwrap();
        assert_eq!(plan, EnablePlan::Subscribe(FeatureMask::ACCELERATION));
        manager.commit_enable(&device.id, Channel::Acceleration, FeatureMask::ACCELERATION);

        assert_eq!(
            manager.plan_enable(&device, &profile, Channel::Acceleration),
            Ok(EnablePlan::AlreadyEnabled)
        );
        assert_eq!(manager.active_subscriptions(), 1);
    }

    #[test]
    fn test_unsupported_channel() {
        let manager = SubscriptionManager::new();
        assert!(matches!(
            manager.plan_enable(&connected("01"), &split_profile("01"), Channel::Magnetic),
            Err(SubscriptionError::UnsupportedChannel { .. })
        ));
    }

    #[test]
    fn test_shared_characteristic_refcount() {
        let mut manager = SubscriptionManager::new();
        let device = connected("01");
        let profile = DeviceProfile::new(device.id.clone()).with_characteristic(FeatureMask::INERTIAL);

        manager.commit_enable(&device.id, Channel::Acceleration, FeatureMask::INERTIAL);
        assert_eq!(
            manager.plan_enable(&device, &profile, Channel::AngularRate),
            Ok(EnablePlan::Share(FeatureMask::INERTIAL))
        );
        manager.commit_enable(&device.id, Channel::AngularRate, FeatureMask::INERTIAL);
        assert_eq!(manager.active_subscriptions(), 1);

        assert_eq!(
            manager.plan_disable(&device.id, Channel::Acceleration),
            DisablePlan::Release(FeatureMask::INERTIAL)
        );
        manager.commit_disable(&device.id, Channel::Acceleration);
        assert_eq!(
            manager.plan_disable(&device.id, Channel::AngularRate),
            DisablePlan::Unsubscribe(FeatureMask::INERTIAL)
        );
    }

    #[test]
    fn test_disable_unknown_is_noop() {
        let manager = SubscriptionManager::new();
        assert_eq!(
            manager.plan_disable(&DeviceId::new("01"), Channel::Acceleration),
            DisablePlan::NotEnabled
        );
    }

    #[test]
    fn test_clear_returns_open_characteristics() {
        let mut manager = SubscriptionManager::new();
        let id = DeviceId::new("01");
        manager.commit_enable(&id, Channel::Acceleration, FeatureMask::INERTIAL);
        manager.commit_enable(&id, Channel::AngularRate, FeatureMask::INERTIAL);
        assert_eq!(manager.clear(&id), vec![FeatureMask::INERTIAL]);
        assert!(manager.enabled(&id).is_empty());
        assert_eq!(manager.active_subscriptions(), 0);
    }
}
