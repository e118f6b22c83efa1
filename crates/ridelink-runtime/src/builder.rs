//! Runtime Builder API
//!
//! Provides a builder-style API for hosts (CLI, tests) to wire a link
//! adapter and the outer collaborators into a running session and get back
//! a cloneable handle.

use std::sync::Arc;
use std::time::Duration;

use ridelink_core::{
    create_link_event_channel, CatalogService, Channel, Device, DeviceId, DiscoveryReceiver,
    Environment, EventBus, EventReceiver, LinkAdapter, LocationProvider, NoLocation, RideRecord,
    RideSink, RidelinkError, RidelinkResult, SessionConfig, SystemTimeSource, TelemetryReceiver,
    TimeSource, UserIdentity,
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::info;

use crate::task::{Command, Responder, SessionServices, SessionStatus, SessionTask};

// ----------------------------------------------------------------------------
// Runtime Builder
// ----------------------------------------------------------------------------

/// Builder for a session runtime
pub struct RuntimeBuilder {
    link: Arc<dyn LinkAdapter>,
    config: SessionConfig,
    catalog: Option<Arc<dyn CatalogService>>,
    environment: Environment,
    location: Arc<dyn LocationProvider>,
    sink: Option<Arc<dyn RideSink>>,
    user: UserIdentity,
    clock: Arc<dyn TimeSource>,
}

impl RuntimeBuilder {
    /// Create a new runtime builder around a link adapter
    pub fn new(link: Arc<dyn LinkAdapter>) -> Self {
        Self {
            link,
            config: SessionConfig::default(),
            catalog: None,
            environment: Environment::default(),
            location: Arc::new(NoLocation),
            sink: None,
            user: UserIdentity("anonymous".to_string()),
            clock: Arc::new(SystemTimeSource),
        }
    }

    /// Set the session configuration
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Match connected devices against this catalog service
    pub fn with_catalog_service(mut self, service: Arc<dyn CatalogService>) -> Self {
        self.catalog = Some(service);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_location_provider(mut self, provider: Arc<dyn LocationProvider>) -> Self {
        self.location = provider;
        self
    }

    /// Hand finished rides to this sink
    pub fn with_ride_sink(mut self, sink: Arc<dyn RideSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_user(mut self, user: UserIdentity) -> Self {
        self.user = user;
        self
    }

    /// Clock used to stamp rides and telemetry
    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    /// Attach the link adapter and spawn the session task
    pub async fn start(self) -> RidelinkResult<RuntimeHandle> {
        self.config.validate()?;
        let channels = self.config.channels.clone();

        let (link_sender, link_receiver) =
            create_link_event_channel(channels.link_event_buffer_size);
        self.link.attach_events(link_sender)?;

        let (command_sender, command_receiver) = mpsc::channel(channels.command_buffer_size);
        let bus = EventBus::new(channels.bus_capacity);

        let services = SessionServices {
            catalog: self.catalog,
            environment: self.environment,
            location: self.location,
            sink: self.sink,
            user: self.user,
            clock: self.clock,
        };
        let adapter = self.link.adapter_name();
        let task = SessionTask::new(
            self.config,
            self.link,
            services,
            bus.clone(),
            command_receiver,
            link_receiver,
        );
        let join = tokio::spawn(task.run());

        info!(adapter, "Session runtime started");
        Ok(RuntimeHandle {
            commands: command_sender,
            bus,
            join: Arc::new(Mutex::new(Some(join))),
        })
    }
}

// ----------------------------------------------------------------------------
// Runtime Handle
// ----------------------------------------------------------------------------

/// Cloneable handle to a running session
///
/// Dropping every handle stops the session the same way `shutdown` does.
#[derive(Clone)]
pub struct RuntimeHandle {
    commands: mpsc::Sender<Command>,
    bus: EventBus,
    join: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RuntimeHandle {
    async fn request<T>(&self, command: impl FnOnce(Responder<T>) -> Command) -> RidelinkResult<T> {
        let (responder, reply) = oneshot::channel();
        self.commands
            .send(command(responder))
            .await
            .map_err(|_| RidelinkError::channel_closed("command"))?;
        reply
            .await
            .map_err(|_| RidelinkError::channel_closed("reply"))?
    }

    /// Check if the session task is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    pub async fn start_discovery(&self) -> RidelinkResult<()> {
        self.request(Command::StartDiscovery).await
    }

    pub async fn stop_discovery(&self) -> RidelinkResult<()> {
        self.request(Command::StopDiscovery).await
    }

    /// Forget every visible device
    pub async fn reset_discovery(&self) -> RidelinkResult<()> {
        self.request(Command::ResetDiscovery).await
    }

    /// Snapshot of the visible devices
    pub async fn devices(&self) -> RidelinkResult<Vec<Device>> {
        self.request(Command::Devices).await
    }

    /// Connect to a discovered device; resolves once connected or failed
    pub async fn connect(&self, id: &DeviceId) -> RidelinkResult<Device> {
        let id = id.clone();
        self.request(|responder| Command::Connect { id, responder })
            .await
    }

    /// Disconnect, or abort a pending attempt; a no-op when idle
    pub async fn disconnect(&self) -> RidelinkResult<()> {
        self.request(Command::Disconnect).await
    }

    pub async fn enable(&self, id: &DeviceId, channel: Channel) -> RidelinkResult<()> {
        let id = id.clone();
        self.request(|responder| Command::Enable {
            id,
            channel,
            responder,
        })
        .await
    }

    pub async fn disable(&self, id: &DeviceId, channel: Channel) -> RidelinkResult<()> {
        let id = id.clone();
        self.request(|responder| Command::Disable {
            id,
            channel,
            responder,
        })
        .await
    }

    pub async fn start_ride(&self) -> RidelinkResult<()> {
        self.request(Command::StartRide).await
    }

    /// Finish the ride; the record is also published and handed to the sink
    pub async fn stop_ride(&self) -> RidelinkResult<RideRecord> {
        self.request(Command::StopRide).await
    }

    pub async fn status(&self) -> RidelinkResult<SessionStatus> {
        self.request(Command::Status).await
    }

    /// Every session event from now on
    pub fn events(&self) -> EventReceiver {
        self.bus.subscribe()
    }

    pub fn discovery_events(&self) -> DiscoveryReceiver {
        self.bus.discovery()
    }

    pub fn telemetry(&self, channel: Channel) -> TelemetryReceiver {
        self.bus.telemetry(channel)
    }

    /// Stop scanning, disconnect and end the session task
    pub async fn shutdown(&self) -> RidelinkResult<()> {
        info!("Shutting down session runtime");

        match self.request(Command::Shutdown).await {
            Ok(()) | Err(RidelinkError::ChannelClosed { .. }) => {}
            Err(error) => return Err(error),
        }

        if let Some(join) = self.join.lock().await.take() {
            let _ = tokio::time::timeout(Duration::from_secs(10), join).await;
        }
        info!("Session runtime shut down");
        Ok(())
    }
}
