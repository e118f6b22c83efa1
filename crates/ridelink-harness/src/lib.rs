//! Ridelink Harness - Testing Framework
//!
//! Lets the session runtime run end to end without a radio:
//!
//! - **MockLink**: a scripted `LinkAdapter` with connect behaviors
//!   (accept, reject, hang), link drops, notification loss and corruption,
//!   and a log of every call the runtime made
//! - **SensorSimulator**: deterministic triangle-wave frames pushed on the
//!   subscribed characteristics of a scripted device
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ridelink_harness::{MockDevice, MockLink};
//! use ridelink_runtime::RuntimeBuilder;
//!
//! let link = MockLink::ideal();
//! link.add_device(MockDevice::sensor_box("AA:01", "BOX-01")).await;
//!
//! let runtime = RuntimeBuilder::new(Arc::new(link.clone())).start().await?;
//! runtime.start_discovery().await?;
//! ```

pub mod mock_link;
pub mod simulator;

pub use mock_link::{
    ConnectBehavior, LinkCall, MockDevice, MockLink, MockLinkConfig, MockLinkStats,
    SENSOR_BOX_DEVICE_TYPE, SENSOR_BOX_FIRMWARE_ID,
};
pub use simulator::{SensorSimulator, SimulatorConfig};
