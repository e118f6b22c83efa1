//! Bluetooth Low Energy link adapter for ridelink
//!
//! Implements the `LinkAdapter` trait from `ridelink-core` on top of
//! btleplug's central role, for SensorTile.box-class devices speaking the
//! BlueST protocol.
//!
//! ## Architecture
//!
//! - [`config`] - Adapter selection and discovery settings
//! - [`error`] - Error types specific to the BLE link
//! - [`protocol`] - BlueST advertising formats
//! - [`link`] - The adapter itself and its background tasks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ridelink_ble::{BleLink, BleLinkConfig};
//! use ridelink_runtime::RuntimeBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let link = BleLink::new(BleLinkConfig::new().with_name_prefix("STBOX"));
//! let runtime = RuntimeBuilder::new(Arc::new(link)).start().await?;
//! runtime.start_discovery().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod link;
mod protocol;

pub use config::BleLinkConfig;
pub use error::BleLinkError;
pub use link::BleLink;
pub use protocol::{
    parse_manufacturer_data, BlueStAdvertisement, BLUEST_V1, BLUEST_V2, STMICRO_COMPANY_ID,
};
