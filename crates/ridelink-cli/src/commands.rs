//! Command handlers for the ridelink CLI

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use ridelink_ble::BleLink;
use ridelink_core::catalog::parse_hex_id;
use ridelink_core::{
    CatalogService, Channel, ConnectionEvent, Device, DiscoveryEvent, FirmwareEvent,
    FirmwareIdentity, LinkAdapter, RideEvent, RideRecord, Sample, SessionEvent,
};
use ridelink_harness::{MockDevice, MockLink, MockLinkConfig, SensorSimulator, SimulatorConfig};
use ridelink_runtime::{RuntimeBuilder, RuntimeHandle};

use crate::cli::{Cli, Commands};
use crate::config::CliAppConfig;
use crate::error::{CliError, Result};
use crate::services::{location_provider, FileCatalogService, JsonRideSink};

/// How long `stream` and `ride` look for the requested device
const DEVICE_SEARCH_WINDOW: Duration = Duration::from_secs(10);

const SIMULATED_DEVICE_ID: &str = "SIM:00:01";
const SIMULATED_DEVICE_NAME: &str = "SIM-BOX";

// ----------------------------------------------------------------------------
// Gateway
// ----------------------------------------------------------------------------

/// A running session plus the simulator feeding it, if any
struct Gateway {
    handle: RuntimeHandle,
    simulator: Option<JoinHandle<()>>,
}

impl Gateway {
    async fn start(config: &CliAppConfig, simulate: bool) -> Result<Self> {
        let mut simulator = None;
        let link: Arc<dyn LinkAdapter> = if simulate {
            let (link, task) = Self::simulated_link().await;
            simulator = Some(task);
            Arc::new(link)
        } else {
            Arc::new(BleLink::new(config.ble.clone()))
        };

        let mut builder = RuntimeBuilder::new(link)
            .with_config(config.session.clone())
            .with_environment(config.catalog.environment)
            .with_location_provider(location_provider(&config.location))
            .with_ride_sink(Arc::new(JsonRideSink::new(&config.output.ride_dir)))
            .with_user(config.user.identity());
        if let Some(dir) = &config.catalog.dir {
            builder = builder.with_catalog_service(Arc::new(FileCatalogService::new(dir)));
        }

        let handle = builder.start().await?;
        Ok(Self { handle, simulator })
    }

    /// A mock link with one sensor box streaming a synthetic wave
    async fn simulated_link() -> (MockLink, JoinHandle<()>) {
        let link = MockLink::new(MockLinkConfig::default());
        let device = MockDevice::sensor_box(SIMULATED_DEVICE_ID, SIMULATED_DEVICE_NAME);
        let characteristics = device.profile.characteristics.clone();
        let id = device.id().clone();
        link.add_device(device).await;

        info!(device = %id, "Simulating sensor box");
        let simulator =
            SensorSimulator::new(link.clone(), id, characteristics, SimulatorConfig::default())
                .spawn();
        (link, simulator)
    }

    async fn shutdown(self) -> Result<()> {
        if let Some(simulator) = self.simulator {
            simulator.abort();
        }
        self.handle.shutdown().await?;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Command Dispatcher
// ----------------------------------------------------------------------------

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: CliAppConfig) -> Result<()> {
        match cli.command {
            Commands::Scan { seconds } => {
                let gateway = Gateway::start(&config, cli.simulate).await?;
                let result = Self::handle_scan_command(&gateway.handle, seconds).await;
                gateway.shutdown().await?;
                result
            }
            Commands::Stream {
                device,
                channels,
                seconds,
            } => {
                let gateway = Gateway::start(&config, cli.simulate).await?;
                let result =
                    Self::handle_stream_command(&gateway.handle, &device, &channels, seconds).await;
                gateway.shutdown().await?;
                result
            }
            Commands::Ride { device, seconds } => {
                let gateway = Gateway::start(&config, cli.simulate).await?;
                let result = Self::handle_ride_command(&gateway.handle, &device, seconds).await;
                gateway.shutdown().await?;
                if let Ok(record) = &result {
                    let sink = JsonRideSink::new(&config.output.ride_dir);
                    println!("Stored {}", sink.path_for(record.id).display());
                }
                result.map(|_| ())
            }
            Commands::Firmware {
                device_id,
                firmware_id,
            } => Self::handle_firmware_command(&config, &device_id, &firmware_id).await,
        }
    }

    /// Handle the scan command
    async fn handle_scan_command(handle: &RuntimeHandle, seconds: u64) -> Result<()> {
        info!("Scanning for {}s", seconds);
        let mut discovery = handle.discovery_events();
        handle.start_discovery().await?;

        let deadline = Instant::now() + Duration::from_secs(seconds);
        while let Ok(Some(event)) = timeout_at(deadline, discovery.recv()).await {
            match event {
                DiscoveryEvent::Found(device) => {
                    debug!(device = %device.id, name = %device.name, "Device found")
                }
                DiscoveryEvent::Lost(ids) => debug!(count = ids.len(), "Devices lost"),
            }
        }

        handle.stop_discovery().await?;
        let devices = handle.devices().await?;
        if devices.is_empty() {
            println!("No devices found");
        }
        for device in &devices {
            print_device(device);
        }
        Ok(())
    }

    /// Handle the stream command
    async fn handle_stream_command(
        handle: &RuntimeHandle,
        selector: &str,
        channels: &[Channel],
        seconds: u64,
    ) -> Result<()> {
        let mut events = handle.events();
        let device = Self::connect(handle, selector).await?;
        let enabled = Self::enable_channels(handle, &device, channels).await?;

        let deadline = Instant::now() + Duration::from_secs(seconds);
        while let Ok(Some(event)) = timeout_at(deadline, events.recv()).await {
            match event {
                SessionEvent::Telemetry { device: id, event } if id == device.id => {
                    print_sample(&event.sample)
                }
                SessionEvent::Firmware(event) => report_firmware(&event),
                SessionEvent::Connection(ConnectionEvent::DeviceDisconnected(lost)) => {
                    // Subscriptions went with the link
                    warn!(device = %lost.id, "Device disconnected while streaming");
                    return Ok(());
                }
                _ => {}
            }
        }
        if events.skipped() > 0 {
            warn!(skipped = events.skipped(), "Output fell behind, events were dropped");
        }

        for channel in enabled {
            if let Err(e) = handle.disable(&device.id, channel).await {
                warn!(channel = %channel, "Failed to disable channel: {}", e);
            }
        }
        handle.disconnect().await?;
        Ok(())
    }

    /// Handle the ride command
    async fn handle_ride_command(
        handle: &RuntimeHandle,
        selector: &str,
        seconds: u64,
    ) -> Result<RideRecord> {
        let mut events = handle.events();
        let device = Self::connect(handle, selector).await?;
        Self::enable_channels(
            handle,
            &device,
            &[Channel::Acceleration, Channel::AngularRate],
        )
        .await?;

        handle.start_ride().await?;
        let deadline = Instant::now() + Duration::from_secs(seconds);
        while let Ok(Some(event)) = timeout_at(deadline, events.recv()).await {
            match event {
                SessionEvent::Ride(RideEvent::Elapsed { display, .. }) => {
                    println!("Ride {}", display)
                }
                SessionEvent::Firmware(event) => report_firmware(&event),
                _ => {}
            }
        }

        let record = handle.stop_ride().await?;
        handle.disconnect().await?;

        println!(
            "Ride {} finished: {} with {} samples",
            record.id,
            record.duration_display(),
            record.sample_count()
        );
        Ok(record)
    }

    /// Handle the firmware command
    async fn handle_firmware_command(
        config: &CliAppConfig,
        device_id: &str,
        firmware_id: &str,
    ) -> Result<()> {
        let device_id = parse_hex_id(device_id)
            .ok_or_else(|| CliError::InvalidArgument(format!("device id {}", device_id)))?;
        let firmware_id = parse_hex_id(firmware_id)
            .ok_or_else(|| CliError::InvalidArgument(format!("firmware id {}", firmware_id)))?;
        let dir = config.catalog.dir.as_ref().ok_or_else(|| {
            CliError::InvalidArgument("no catalog directory configured".to_string())
        })?;

        let catalog = FileCatalogService::new(dir)
            .fetch_catalog(config.catalog.environment)
            .await
            .map_err(ridelink_core::RidelinkError::from)?;

        let identity = FirmwareIdentity {
            device_type: device_id,
            firmware_id,
        };
        match catalog.require(identity) {
            Ok(entry) => {
                let channels: Vec<&str> = entry.channels().iter().map(Channel::name).collect();
                println!(
                    "{}: {} {} ({}) {}",
                    identity,
                    entry.firmware_name,
                    entry.version,
                    entry.board_name,
                    channels.join(",")
                )
            }
            // No entry just means no update is available
            Err(error) => println!("{} (catalog {})", error, catalog.version),
        }
        Ok(())
    }

    /// Discover the device named by `selector` and connect to it
    async fn connect(handle: &RuntimeHandle, selector: &str) -> Result<Device> {
        let mut discovery = handle.discovery_events();
        handle.start_discovery().await?;

        let deadline = Instant::now() + DEVICE_SEARCH_WINDOW;
        let mut found = handle
            .devices()
            .await?
            .into_iter()
            .find(|device| device.matches(selector));
        while found.is_none() {
            match timeout_at(deadline, discovery.recv()).await {
                Ok(Some(DiscoveryEvent::Found(device))) if device.matches(selector) => {
                    found = Some(device)
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        handle.stop_discovery().await?;

        let device = found.ok_or_else(|| CliError::DeviceNotFound(selector.to_string()))?;
        info!(device = %device.id, name = %device.name, "Connecting");
        Ok(handle.connect(&device.id).await?)
    }

    /// Enable the channels the device supports; at least one must succeed
    async fn enable_channels(
        handle: &RuntimeHandle,
        device: &Device,
        channels: &[Channel],
    ) -> Result<Vec<Channel>> {
        let mut enabled = Vec::new();
        for &channel in channels {
            match handle.enable(&device.id, channel).await {
                Ok(()) => enabled.push(channel),
                Err(e) => warn!(channel = %channel, "Channel not enabled: {}", e),
            }
        }
        if enabled.is_empty() {
            return Err(CliError::InvalidArgument(format!(
                "{} supports none of the requested channels",
                device.name
            )));
        }
        Ok(enabled)
    }
}

// ----------------------------------------------------------------------------
// Output
// ----------------------------------------------------------------------------

fn print_device(device: &Device) {
    let firmware = device
        .firmware
        .map(|firmware| firmware.to_string())
        .unwrap_or_else(|| "-".to_string());
    let channels: Vec<&str> = device.capabilities.iter().map(Channel::name).collect();
    println!(
        "{:<20} {:<16} {:>5} {:<18} {}",
        device.id.as_str(),
        device.name,
        device.rssi.map(|rssi| rssi.to_string()).unwrap_or_default(),
        firmware,
        channels.join(",")
    );
}

fn print_sample(sample: &Sample) {
    let scale = sample.channel.scale();
    println!(
        "{:<12} {:>5} {:>9.1} {:>9.1} {:>9.1} {}",
        sample.channel.name(),
        sample.timestamp,
        f32::from(sample.axes.x) * scale,
        f32::from(sample.axes.y) * scale,
        f32::from(sample.axes.z) * scale,
        sample.channel.unit()
    );
}

fn report_firmware(event: &FirmwareEvent) {
    match event {
        FirmwareEvent::Matched { device, entry } => info!(
            device = %device,
            version = %entry.version,
            "Compatible firmware in catalog"
        ),
        FirmwareEvent::Mismatch { device, error } => {
            info!(device = %device, "{}", error)
        }
        FirmwareEvent::CatalogUnavailable { reason } => {
            debug!("Firmware catalog unavailable: {}", reason)
        }
    }
}
