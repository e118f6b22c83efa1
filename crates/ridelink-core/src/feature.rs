//! Sensor channels and their BlueST feature masks
//!
//! Every notifying characteristic of the box is named by a 32-bit feature mask
//! encoded in the first four bytes of its UUID. A characteristic can carry a
//! single channel or several channels packed into one frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Base UUID shared by all BlueST feature characteristics (mask bytes zeroed)
pub const FEATURE_UUID_BASE: u128 = 0x0000_0000_0001_11e1_ac36_0002_a5d5_c51b;

/// Bits of a characteristic UUID that hold the feature mask
const FEATURE_UUID_MASK_SHIFT: u32 = 96;

// ----------------------------------------------------------------------------
// Feature Mask
// ----------------------------------------------------------------------------

/// Set of channel bits carried by one characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureMask(u32);

impl FeatureMask {
    pub const ACCELERATION: Self = Self(0x0080_0000);
    pub const ANGULAR_RATE: Self = Self(0x0040_0000);
    pub const MAGNETIC: Self = Self(0x0020_0000);
    pub const INERTIAL: Self = Self(0x00E0_0000);
    pub const EMPTY: Self = Self(0);

    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub fn contains(&self, other: FeatureMask) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn union(self, other: FeatureMask) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Bits that do not belong to any known channel
    pub fn unknown_bits(&self) -> u32 {
        self.0 & !Self::INERTIAL.0
    }

    /// Channels carried by this mask, ordered from the highest bit down
    ///
    /// This is also the order in which their axes appear in a frame.
    pub fn channels(&self) -> SmallVec<[Channel; 4]> {
        Channel::ALL
            .iter()
            .copied()
            .filter(|channel| self.contains(channel.mask()))
            .collect()
    }

    /// Position of `channel` within a frame carrying this mask
    pub fn slot_of(&self, channel: Channel) -> Option<usize> {
        self.channels().iter().position(|c| *c == channel)
    }

    /// UUID of the characteristic exposing this mask
    pub fn characteristic_uuid(&self) -> Uuid {
        Uuid::from_u128(FEATURE_UUID_BASE | ((self.0 as u128) << FEATURE_UUID_MASK_SHIFT))
    }

    /// Recover the mask from a BlueST feature characteristic UUID
    pub fn from_characteristic_uuid(uuid: &Uuid) -> Option<Self> {
        let value = uuid.as_u128();
        let base_mask = (1u128 << FEATURE_UUID_MASK_SHIFT) - 1;
        if value & base_mask != FEATURE_UUID_BASE {
            return None;
        }
        Some(Self((value >> FEATURE_UUID_MASK_SHIFT) as u32))
    }
}

impl fmt::Display for FeatureMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<Channel> for FeatureMask {
    fn from(channel: Channel) -> Self {
        channel.mask()
    }
}

// ----------------------------------------------------------------------------
// Channel
// ----------------------------------------------------------------------------

/// A named sensor stream exposed by a connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Acceleration,
    AngularRate,
    Magnetic,
}

impl Channel {
    /// All channels, highest mask bit first
    pub const ALL: [Channel; 3] = [Channel::Acceleration, Channel::AngularRate, Channel::Magnetic];

    pub fn mask(&self) -> FeatureMask {
        match self {
            Channel::Acceleration => FeatureMask::ACCELERATION,
            Channel::AngularRate => FeatureMask::ANGULAR_RATE,
            Channel::Magnetic => FeatureMask::MAGNETIC,
        }
    }

    /// Largest magnitude a raw axis may take, if the channel has a full scale
    ///
    /// Acceleration is in mg (±16 g), angular rate in tenths of dps (±2000 dps).
    pub fn full_scale(&self) -> Option<i16> {
        match self {
            Channel::Acceleration => Some(16_000),
            Channel::AngularRate => Some(20_000),
            Channel::Magnetic => None,
        }
    }

    /// Multiplier from raw axis units to the physical unit
    pub fn scale(&self) -> f32 {
        match self {
            Channel::Acceleration => 1.0,
            Channel::AngularRate => 0.1,
            Channel::Magnetic => 1.0,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Acceleration => "mg",
            Channel::AngularRate => "dps",
            Channel::Magnetic => "mGa",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Channel::Acceleration => "acceleration",
            Channel::AngularRate => "angular_rate",
            Channel::Magnetic => "magnetic",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acc" | "accel" | "acceleration" => Ok(Channel::Acceleration),
            "gyro" | "gyroscope" | "angular_rate" => Ok(Channel::AngularRate),
            "mag" | "magnetometer" | "magnetic" => Ok(Channel::Magnetic),
            other => Err(format!("unknown channel: {}", other)),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristic_uuid_round_trip() {
        let uuid = FeatureMask::ACCELERATION.characteristic_uuid();
        assert_eq!(
            uuid.to_string(),
            "00800000-0001-11e1-ac36-0002a5d5c51b"
        );
        assert_eq!(
            FeatureMask::from_characteristic_uuid(&uuid),
            Some(FeatureMask::ACCELERATION)
        );
    }

    #[test]
    fn test_foreign_uuid_rejected() {
        let nus = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);
        assert_eq!(FeatureMask::from_characteristic_uuid(&nus), None);
    }

    #[test]
    fn test_inertial_mask_channel_order() {
        let channels = FeatureMask::INERTIAL.channels();
        assert_eq!(
            channels.as_slice(),
            &[Channel::Acceleration, Channel::AngularRate, Channel::Magnetic]
        );
        assert_eq!(FeatureMask::INERTIAL.slot_of(Channel::AngularRate), Some(1));

        let acc_gyro = FeatureMask::ACCELERATION.union(FeatureMask::ANGULAR_RATE);
        assert_eq!(acc_gyro.slot_of(Channel::Magnetic), None);
    }

    #[test]
    fn test_unknown_bits() {
        assert_eq!(FeatureMask::INERTIAL.unknown_bits(), 0);
        assert_eq!(FeatureMask::new(0x0000_0001).unknown_bits(), 1);
        assert!(!FeatureMask::EMPTY.contains(FeatureMask::EMPTY));
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!("acc".parse::<Channel>(), Ok(Channel::Acceleration));
        assert_eq!("Gyro".parse::<Channel>(), Ok(Channel::AngularRate));
        assert!("pressure".parse::<Channel>().is_err());
    }
}
