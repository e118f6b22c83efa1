//! Firmware catalog and matcher
//!
//! The catalog is a versioned JSON artifact fetched once per session from an
//! external service. Matching is an exact lookup on the (device id, firmware id)
//! pair advertised by the box.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::CatalogError;
use crate::feature::{Channel, FeatureMask};
use crate::types::FirmwareIdentity;

// ----------------------------------------------------------------------------
// Environment
// ----------------------------------------------------------------------------

/// Catalog publication environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Production => "prod",
            Environment::Development => "dev",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prod" | "production" => Ok(Environment::Production),
            "dev" | "development" => Ok(Environment::Development),
            other => Err(CatalogError::Malformed {
                reason: format!("unknown environment {}", other),
            }),
        }
    }
}

// ----------------------------------------------------------------------------
// Catalog Types
// ----------------------------------------------------------------------------

/// Characteristic advertised by a catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogCharacteristic {
    pub name: String,
    pub uuid: Uuid,
}

/// Firmware metadata for one (device id, firmware id) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirmwareEntry {
    #[serde(rename = "ble_dev_id")]
    pub device_id: String,
    #[serde(rename = "ble_fw_id")]
    pub firmware_id: String,
    #[serde(rename = "brd_name", default)]
    pub board_name: String,
    #[serde(rename = "fw_name", default)]
    pub firmware_name: String,
    #[serde(rename = "fw_version")]
    pub version: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub characteristics: Vec<CatalogCharacteristic>,
}

impl FirmwareEntry {
    /// Numeric identity of this entry, if both ids parse
    pub fn identity(&self) -> Option<FirmwareIdentity> {
        Some(FirmwareIdentity {
            device_type: parse_hex_id(&self.device_id)?,
            firmware_id: parse_hex_id(&self.firmware_id)?,
        })
    }

    /// Sensor channels declared by the entry's feature characteristics
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self
            .characteristics
            .iter()
            .filter_map(|c| FeatureMask::from_characteristic_uuid(&c.uuid))
            .flat_map(|mask| mask.channels())
            .collect();
        channels.sort();
        channels.dedup();
        channels
    }
}

/// Versioned firmware catalog, read-only after fetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Catalog {
    #[serde(alias = "date", default)]
    pub version: String,
    #[serde(default)]
    pub checksum: String,
    #[serde(rename = "bluestsdk_v2", default)]
    pub entries: Vec<FirmwareEntry>,
}

impl Catalog {
    /// Parse a fetched catalog artifact
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(json).map_err(|e| CatalogError::Malformed {
            reason: e.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup on the identity pair
    pub fn find(&self, identity: FirmwareIdentity) -> Option<&FirmwareEntry> {
        self.entries
            .iter()
            .find(|entry| entry.identity() == Some(identity))
    }

    /// Like [`Catalog::find`], but absence is a [`CatalogError::Mismatch`]
    pub fn require(&self, identity: FirmwareIdentity) -> Result<&FirmwareEntry, CatalogError> {
        let mismatch = CatalogError::Mismatch {
            device_id: identity.device_type,
            firmware_id: identity.firmware_id,
        };
        match_firmware(identity.device_type, identity.firmware_id, self).ok_or(mismatch)
    }
}

/// Look up a compatible firmware entry; absence means no update is available
pub fn match_firmware(
    device_id: u8,
    firmware_id: u8,
    catalog: &Catalog,
) -> Option<&FirmwareEntry> {
    catalog.find(FirmwareIdentity {
        device_type: device_id,
        firmware_id,
    })
}

/// Parse a catalog identifier such as `"0x0D"`, `"0D"` or `"0x000D"`
pub fn parse_hex_id(id: &str) -> Option<u8> {
    let trimmed = id.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(|value| u8::try_from(value).ok())
}

// ----------------------------------------------------------------------------
// Catalog Service
// ----------------------------------------------------------------------------

/// External service that publishes the catalog
#[async_trait]
pub trait CatalogService: Send + Sync {
    async fn fetch_catalog(&self, environment: Environment) -> Result<Catalog, CatalogError>;
}

/// Catalog service backed by an already fetched catalog
#[derive(Debug, Clone, Default)]
pub struct StaticCatalogService {
    catalog: Option<Catalog>,
}

impl StaticCatalogService {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: Some(catalog),
        }
    }

    /// A service that always reports the catalog as unavailable
    pub fn unavailable() -> Self {
        Self { catalog: None }
    }
}

#[async_trait]
impl CatalogService for StaticCatalogService {
    async fn fetch_catalog(&self, _environment: Environment) -> Result<Catalog, CatalogError> {
        self.catalog.clone().ok_or_else(|| CatalogError::Unavailable {
            reason: "no catalog configured".to_string(),
        })
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_JSON: &str = r#"{
        "date": "2024-03-01",
        "checksum": "5f2b",
        "bluestsdk_v2": [
            {
                "ble_dev_id": "0x0A",
                "ble_fw_id": "0x0D",
                "brd_name": "SensorTile.box PRO",
                "fw_name": "BLESensorsPnPL",
                "fw_version": "1.2.0",
                "characteristics": [
                    { "name": "Acceleration", "uuid": "00800000-0001-11e1-ac36-0002a5d5c51b" },
                    { "name": "Gyroscope", "uuid": "00400000-0001-11e1-ac36-0002a5d5c51b" },
                    { "name": "Battery", "uuid": "00020000-0001-11e1-ac36-0002a5d5c51b" }
                ]
            },
            {
                "ble_dev_id": "0x0A",
                "ble_fw_id": "0x06",
                "fw_version": "1.0.1"
            }
        ]
    }"#;

    #[test]
    fn test_parse_catalog() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        assert_eq!(catalog.version, "2024-03-01");
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.entries[0].channels(),
            vec![Channel::Acceleration, Channel::AngularRate]
        );
    }

    #[test]
    fn test_exact_match() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        let entry = match_firmware(0x0A, 0x0D, &catalog).unwrap();
        assert_eq!(entry.version, "1.2.0");
        assert_eq!(match_firmware(0x0A, 0x06, &catalog).unwrap().version, "1.0.1");
    }

    #[test]
    fn test_absence_is_not_an_error() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        assert!(match_firmware(0x0B, 0x0D, &catalog).is_none());
        assert!(match_firmware(0x0A, 0x0E, &Catalog::default()).is_none());
    }

    #[test]
    fn test_require_reports_mismatch() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        let found = FirmwareIdentity {
            device_type: 0x0A,
            firmware_id: 0x0D,
        };
        assert_eq!(catalog.require(found).unwrap().version, "1.2.0");

        let missing = FirmwareIdentity {
            device_type: 0x0B,
            firmware_id: 0x0D,
        };
        assert_eq!(
            catalog.require(missing),
            Err(CatalogError::Mismatch {
                device_id: 0x0B,
                firmware_id: 0x0D
            })
        );
    }

    #[test]
    fn test_parse_hex_id() {
        assert_eq!(parse_hex_id("0x0D"), Some(0x0D));
        assert_eq!(parse_hex_id("0d"), Some(0x0D));
        assert_eq!(parse_hex_id("0x000A"), Some(0x0A));
        assert_eq!(parse_hex_id("0x1FF"), None);
        assert_eq!(parse_hex_id("0x"), None);
        assert_eq!(parse_hex_id("zz"), None);
    }

    #[test]
    fn test_malformed_catalog() {
        assert!(matches!(
            Catalog::from_json("{\"bluestsdk_v2\": 3}"),
            Err(CatalogError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn test_static_service() {
        let catalog = Catalog::from_json(CATALOG_JSON).unwrap();
        let service = StaticCatalogService::new(catalog.clone());
        assert_eq!(
            service.fetch_catalog(Environment::Production).await.unwrap(),
            catalog
        );
        assert!(matches!(
            StaticCatalogService::unavailable()
                .fetch_catalog(Environment::Development)
                .await,
            Err(CatalogError::Unavailable { .. })
        ));
    }
}
