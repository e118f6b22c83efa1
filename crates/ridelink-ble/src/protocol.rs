//! BlueST advertising protocol
//!
//! Sensor boxes advertise their board and firmware in manufacturer specific
//! data. Two layouts are in the field:
//!
//! - v2, under the STMicroelectronics company id:
//!   `[0x02, board id, firmware id, active bank, option, option, mac..]`
//! - v1, without a company id, so the first two bytes land in the key:
//!   key `board id << 8 | 0x01`, value `[feature mask (u32 BE), mac..]`

use std::collections::HashMap;

use ridelink_core::{FeatureMask, FirmwareIdentity};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Bluetooth SIG company id of STMicroelectronics
pub const STMICRO_COMPANY_ID: u16 = 0x0030;

/// Advertising protocol versions
pub const BLUEST_V1: u8 = 0x01;
pub const BLUEST_V2: u8 = 0x02;

const V2_MIN_LEN: usize = 6;
const V1_MIN_LEN: usize = 4;

// ----------------------------------------------------------------------------
// Advertisement
// ----------------------------------------------------------------------------

/// Identity a sensor box announces while advertising
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlueStAdvertisement {
    pub protocol_version: u8,
    pub board_id: u8,
    /// Only v2 advertises the firmware
    pub firmware_id: Option<u8>,
    /// Only v1 advertises the feature set
    pub features: Option<FeatureMask>,
    /// Flash bank the running firmware was booted from (v2)
    pub active_bank: Option<u8>,
}

impl BlueStAdvertisement {
    pub fn firmware(&self) -> Option<FirmwareIdentity> {
        self.firmware_id.map(|firmware_id| FirmwareIdentity {
            device_type: self.board_id,
            firmware_id,
        })
    }

    /// Parse a v2 payload found under `company_id`
    pub fn parse_v2(payload: &[u8]) -> Option<Self> {
        if payload.len() < V2_MIN_LEN || payload[0] != BLUEST_V2 {
            return None;
        }
        Some(Self {
            protocol_version: BLUEST_V2,
            board_id: payload[1],
            firmware_id: Some(payload[2]),
            features: None,
            active_bank: Some(payload[3]),
        })
    }

    /// Parse a v1 entry whose leading bytes were read as the company id
    pub fn parse_v1(key: u16, payload: &[u8]) -> Option<Self> {
        let [version, board_id] = key.to_le_bytes();
        if version != BLUEST_V1 || payload.len() < V1_MIN_LEN {
            return None;
        }
        let bits = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        Some(Self {
            protocol_version: BLUEST_V1,
            board_id,
            firmware_id: None,
            features: Some(FeatureMask::new(bits)),
            active_bank: None,
        })
    }
}

/// Find a BlueST advertisement in the manufacturer data of a peripheral
pub fn parse_manufacturer_data(
    data: &HashMap<u16, Vec<u8>>,
    company_id: u16,
) -> Option<BlueStAdvertisement> {
    if let Some(adv) = data
        .get(&company_id)
        .and_then(|payload| BlueStAdvertisement::parse_v2(payload))
    {
        return Some(adv);
    }
    data.iter()
        .find_map(|(key, payload)| BlueStAdvertisement::parse_v1(*key, payload))
}
