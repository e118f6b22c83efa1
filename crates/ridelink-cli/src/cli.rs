//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use ridelink_core::Channel;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Run against a simulated sensor box instead of the BLE adapter
    #[arg(long)]
    pub simulate: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// List sensor boxes in range
    Scan {
        /// How long to scan
        #[arg(short, long, default_value_t = 5)]
        seconds: u64,
    },
    /// Connect to a device and print its samples
    Stream {
        /// Device id or advertised name
        #[arg(short, long)]
        device: String,
        /// Channels to enable (acc, gyro, mag)
        #[arg(long = "channel", default_values = ["acc", "gyro"])]
        channels: Vec<Channel>,
        /// How long to stream
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },
    /// Record a ride and store the finished record
    Ride {
        /// Device id or advertised name
        #[arg(short, long)]
        device: String,
        /// Ride length
        #[arg(short, long, default_value_t = 60)]
        seconds: u64,
    },
    /// Look up a device/firmware pair in the firmware catalog
    Firmware {
        /// Device type, e.g. 0x0A
        #[arg(long)]
        device_id: String,
        /// Firmware id, e.g. 0x0D
        #[arg(long)]
        firmware_id: String,
    },
}
