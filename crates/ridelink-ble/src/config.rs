//! BLE link configuration

use std::time::Duration;

use uuid::Uuid;

use crate::protocol::STMICRO_COMPANY_ID;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE link adapter
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct BleLinkConfig {
    /// Which host adapter to use when several are present
    pub adapter_index: usize,
    /// Devices whose local name starts with this prefix are reported even
    /// without BlueST manufacturer data; empty accepts none
    pub name_prefix: String,
    /// Bluetooth SIG company id carried in the advertising payload
    pub company_id: u16,
    /// Restrict the scan to devices advertising one of these services
    pub scan_filter_services: Vec<Uuid>,
    /// A device not heard from for this long is reported lost
    pub lost_after: Duration,
}

impl Default for BleLinkConfig {
    fn default() -> Self {
        Self {
            adapter_index: 0,
            name_prefix: String::new(),
            company_id: STMICRO_COMPANY_ID,
            scan_filter_services: Vec::new(),
            lost_after: Duration::from_secs(10),
        }
    }
}

impl BleLinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the adapter index
    pub fn with_adapter_index(mut self, index: usize) -> Self {
        self.adapter_index = index;
        self
    }

    /// Set device name prefix
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_company_id(mut self, company_id: u16) -> Self {
        self.company_id = company_id;
        self
    }

    pub fn with_scan_filter_services(mut self, services: Vec<Uuid>) -> Self {
        self.scan_filter_services = services;
        self
    }

    pub fn with_lost_after(mut self, lost_after: Duration) -> Self {
        self.lost_after = lost_after;
        self
    }
}
