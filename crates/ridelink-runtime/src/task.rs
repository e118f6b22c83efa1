//! Session task
//!
//! The single serialization point of a session. Every state change (discovery
//! set, connection slot, subscriptions, ride) happens on this task in the
//! order its inputs arrive:
//!
//! - commands from [`RuntimeHandle`](crate::RuntimeHandle)s, each carrying a
//!   oneshot reply channel
//! - link events from the adapter
//! - results of connection attempts and catalog fetches, which run as
//!   separate tasks so that a slow peer never blocks the loop
//! - the ride tick while a ride is recording
//!
//! The task is also the only publisher on the event bus, so subscribers see
//! per-device events in order.

use std::sync::Arc;
use std::time::Duration;

use ridelink_core::{
    Catalog, CatalogService, Channel, ConnectionError, ConnectionEvent, ConnectionState, Device,
    DeviceId, DeviceProfile, DiscoveryError, Environment, EventBus, FirmwareEvent, LinkAdapter,
    LinkEvent, LinkEventReceiver, Location, LocationProvider, RideEvent, RideRecord, RideSession,
    RideSink, RideState, RidelinkError, RidelinkResult, SessionConfig, SessionError, SessionEvent,
    SubscriptionError, TelemetryEvent, TimeSource, UserIdentity,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::{interval_at, timeout, Instant, Interval},
};
use tracing::{debug, error, info, warn};

use crate::connection::{ConnectResponder, ConnectStart, ConnectionController, ConnectionStats};
use crate::discovery::DiscoveryScanner;
use crate::router::{RouterStats, TelemetryRouter};
use crate::subscription::{DisablePlan, EnablePlan, SubscriptionManager};

/// Reply channel of a command
pub type Responder<T> = oneshot::Sender<RidelinkResult<T>>;

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Requests from runtime handles to the session task
pub(crate) enum Command {
    StartDiscovery(Responder<()>),
    StopDiscovery(Responder<()>),
    ResetDiscovery(Responder<()>),
    Devices(Responder<Vec<Device>>),
    Connect {
        id: DeviceId,
        responder: ConnectResponder,
    },
    Disconnect(Responder<()>),
    Enable {
        id: DeviceId,
        channel: Channel,
        responder: Responder<()>,
    },
    Disable {
        id: DeviceId,
        channel: Channel,
        responder: Responder<()>,
    },
    StartRide(Responder<()>),
    StopRide(Responder<RideRecord>),
    Status(Responder<SessionStatus>),
    Shutdown(Responder<()>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::StartDiscovery(_) => "start_discovery",
            Command::StopDiscovery(_) => "stop_discovery",
            Command::ResetDiscovery(_) => "reset_discovery",
            Command::Devices(_) => "devices",
            Command::Connect { .. } => "connect",
            Command::Disconnect(_) => "disconnect",
            Command::Enable { .. } => "enable",
            Command::Disable { .. } => "disable",
            Command::StartRide(_) => "start_ride",
            Command::StopRide(_) => "stop_ride",
            Command::Status(_) => "status",
            Command::Shutdown(_) => "shutdown",
        }
    }
}

/// Outcome of a connection attempt task
struct AttemptResult {
    attempt: u64,
    result: Result<DeviceProfile, ConnectionError>,
}

/// Outcome of a catalog fetch task
struct CatalogFetch {
    result: Result<Catalog, String>,
}

/// Snapshot of the session state
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub scanning: bool,
    pub visible_devices: usize,
    pub connection: ConnectionState,
    pub device: Option<Device>,
    pub enabled: Vec<Channel>,
    pub active_subscriptions: usize,
    pub ride: Option<RideState>,
    pub elapsed: Duration,
    pub router: RouterStats,
    pub connections: ConnectionStats,
}

/// Outer collaborators of the session task
pub(crate) struct SessionServices {
    pub catalog: Option<Arc<dyn CatalogService>>,
    pub environment: Environment,
    pub location: Arc<dyn LocationProvider>,
    pub sink: Option<Arc<dyn RideSink>>,
    pub user: UserIdentity,
    pub clock: Arc<dyn TimeSource>,
}

// ----------------------------------------------------------------------------
// Session Task
// ----------------------------------------------------------------------------

/// The task that owns all session state
pub(crate) struct SessionTask {
    config: SessionConfig,
    link: Arc<dyn LinkAdapter>,
    services: SessionServices,
    bus: EventBus,
    commands: mpsc::Receiver<Command>,
    link_events: LinkEventReceiver,
    link_open: bool,
    attempt_sender: mpsc::Sender<AttemptResult>,
    attempt_receiver: mpsc::Receiver<AttemptResult>,
    catalog_sender: mpsc::Sender<CatalogFetch>,
    catalog_receiver: mpsc::Receiver<CatalogFetch>,
    catalog_fetch: Option<JoinHandle<()>>,
    scanner: DiscoveryScanner,
    controller: ConnectionController,
    subscriptions: SubscriptionManager,
    router: TelemetryRouter,
    ride: Option<RideSession>,
    ticker: Option<Interval>,
    catalog: Option<Catalog>,
    running: bool,
}

impl SessionTask {
    pub(crate) fn new(
        config: SessionConfig,
        link: Arc<dyn LinkAdapter>,
        services: SessionServices,
        bus: EventBus,
        commands: mpsc::Receiver<Command>,
        link_events: LinkEventReceiver,
    ) -> Self {
        let (attempt_sender, attempt_receiver) = mpsc::channel(4);
        let (catalog_sender, catalog_receiver) = mpsc::channel(1);
        Self {
            config,
            link,
            services,
            bus,
            commands,
            link_events,
            link_open: true,
            attempt_sender,
            attempt_receiver,
            catalog_sender,
            catalog_receiver,
            catalog_fetch: None,
            scanner: DiscoveryScanner::new(),
            controller: ConnectionController::new(),
            subscriptions: SubscriptionManager::new(),
            router: TelemetryRouter::new(),
            ride: None,
            ticker: None,
            catalog: None,
            running: true,
        }
    }

    /// Run until shutdown or until every handle is dropped
    pub(crate) async fn run(mut self) {
        info!(adapter = self.link.adapter_name(), "Session task starting");

        while self.running {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        debug!(command = command.name(), "Command received");
                        self.handle_command(command).await;
                    }
                    None => {
                        info!("All runtime handles dropped, shutting down");
                        self.close().await;
                        break;
                    }
                },

                event = self.link_events.recv(), if self.link_open => match event {
                    Some(event) => self.handle_link_event(event).await,
                    None => {
                        warn!("Link event channel closed");
                        self.link_open = false;
                    }
                },

                Some(done) = self.attempt_receiver.recv() => {
                    self.handle_attempt(done).await;
                }

                Some(fetched) = self.catalog_receiver.recv() => self.handle_catalog(fetched),

                _ = next_tick(&mut self.ticker) => self.handle_tick(),
            }
        }

        info!("Session task stopped");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartDiscovery(responder) => {
                let _ = responder.send(self.start_discovery().await);
            }
            Command::StopDiscovery(responder) => {
                let _ = responder.send(self.stop_discovery().await);
            }
            Command::ResetDiscovery(responder) => {
                if let Some(event) = self.scanner.reset() {
                    self.bus.publish(SessionEvent::Discovery(event));
                }
                let _ = responder.send(Ok(()));
            }
            Command::Devices(responder) => {
                let _ = responder.send(Ok(self.devices()));
            }
            Command::Connect { id, responder } => self.connect(id, responder),
            Command::Disconnect(responder) => {
                let _ = responder.send(self.disconnect().await);
            }
            Command::Enable {
                id,
                channel,
                responder,
            } => {
                let _ = responder.send(self.enable(&id, channel).await);
            }
            Command::Disable {
                id,
                channel,
                responder,
            } => {
                let _ = responder.send(self.disable(&id, channel).await);
            }
            Command::StartRide(responder) => {
                let _ = responder.send(self.start_ride());
            }
            Command::StopRide(responder) => {
                let _ = responder.send(self.stop_ride().await);
            }
            Command::Status(responder) => {
                let _ = responder.send(Ok(self.status()));
            }
            Command::Shutdown(responder) => {
                self.close().await;
                self.running = false;
                let _ = responder.send(Ok(()));
            }
        }
    }

    async fn start_discovery(&mut self) -> RidelinkResult<()> {
        if !self.scanner.start() {
            return Ok(());
        }
        if let Err(error) = self.link.start_scan().await {
            self.scanner.stop();
            error!(%error, "Failed to start scan");
            return Err(DiscoveryError::ScanFailed {
                reason: error.to_string(),
            }
            .into());
        }
        info!("Discovery started");
        Ok(())
    }

    async fn stop_discovery(&mut self) -> RidelinkResult<()> {
        if !self.scanner.stop() {
            return Ok(());
        }
        if let Err(error) = self.link.stop_scan().await {
            warn!(%error, "Failed to stop scan");
        }
        info!("Discovery stopped");
        Ok(())
    }

    /// Visible devices, with the connection state of the active one
    fn devices(&self) -> Vec<Device> {
        let active = self.controller.active_device();
        self.scanner
            .visible()
            .into_iter()
            .map(|device| match active {
                Some(current) if current.id == device.id => current.clone(),
                _ => device,
            })
            .collect()
    }

    fn connect(&mut self, id: DeviceId, responder: ConnectResponder) {
        let device = match self.scanner.get(&id) {
            Some(device) => device.clone(),
            None => match self.controller.active_device() {
                Some(active) if active.id == id => active.clone(),
                _ => {
                    let _ = responder.send(Err(ConnectionError::UnknownDevice { device: id }.into()));
                    return;
                }
            },
        };

        let attempt = match self.controller.begin(device) {
            Ok(ConnectStart::Started(attempt)) => attempt,
            Ok(ConnectStart::AlreadyConnected(device)) => {
                debug!(device = %device.id, "Already connected");
                let _ = responder.send(Ok(device));
                return;
            }
            Err(error) => {
                debug!(%error, "Connect refused");
                let _ = responder.send(Err(error.into()));
                return;
            }
        };

        info!(device = %id, attempt, "Connecting");
        let link = Arc::clone(&self.link);
        let sender = self.attempt_sender.clone();
        let limit = self.config.connect_timeout;
        let task = tokio::spawn(async move {
            let outcome = timeout(limit, link.connect(&id)).await;
            let result = match outcome {
                Ok(Ok(profile)) => Ok(profile),
                Ok(Err(error)) => Err(ConnectionError::Rejected {
                    device: id,
                    reason: error.to_string(),
                }),
                Err(_) => Err(ConnectionError::Timeout {
                    device: id,
                    timeout: limit,
                }),
            };
            let _ = sender.send(AttemptResult { attempt, result }).await;
        });
        self.controller.attach(attempt, task, responder);
    }

    async fn handle_attempt(&mut self, done: AttemptResult) {
        let Some((responder, result)) = self.controller.complete(done.attempt, done.result) else {
            return;
        };

        match result {
            Ok(device) => {
                info!(device = %device.id, capabilities = ?device.capabilities, "Connected");
                self.bus
                    .publish(SessionEvent::Connection(ConnectionEvent::DeviceConnected(
                        device.clone(),
                    )));
                if let Some(responder) = responder {
                    let _ = responder.send(Ok(device.clone()));
                }
                self.match_firmware(&device);
            }
            Err(error) => {
                warn!(%error, "Connection failed");
                let id = error.device().clone();
                if matches!(error, ConnectionError::Timeout { .. }) {
                    // Cancel whatever the link layer still has pending
                    if let Err(link_error) = self.link.disconnect(&id).await {
                        debug!(%link_error, "Cancel after timeout failed");
                    }
                }
                self.bus
                    .publish(SessionEvent::Connection(ConnectionEvent::ConnectionFailed {
                        id,
                        error: error.clone(),
                    }));
                if let Some(responder) = responder {
                    let _ = responder.send(Err(error.into()));
                }
            }
        }
    }

    async fn disconnect(&mut self) -> RidelinkResult<()> {
        if let Some((device, responder)) = self.controller.abort() {
            info!(device = %device.id, "Connection attempt aborted");
            let error = ConnectionError::Aborted {
                device: device.id.clone(),
            };
            if let Some(responder) = responder {
                let _ = responder.send(Err(error.clone().into()));
            }
            if let Err(link_error) = self.link.disconnect(&device.id).await {
                debug!(%link_error, "Cancel after abort failed");
            }
            self.bus
                .publish(SessionEvent::Connection(ConnectionEvent::ConnectionFailed {
                    id: device.id,
                    error,
                }));
            return Ok(());
        }

        let Some(id) = self.controller.connected_device().map(|d| d.id.clone()) else {
            return Ok(());
        };

        self.disable_all(&id).await;
        self.controller.begin_disconnect();
        let result = self.link.disconnect(&id).await;
        if let Some(device) = self.controller.finish_disconnect() {
            info!(device = %device.id, "Disconnected");
            self.bus
                .publish(SessionEvent::Connection(ConnectionEvent::DeviceDisconnected(device)));
        }
        result.map_err(|error| {
            warn!(device = %id, %error, "Link disconnect failed");
            error.into()
        })
    }

    async fn enable(&mut self, id: &DeviceId, channel: Channel) -> RidelinkResult<()> {
        let (device, profile) = match (
            self.controller.connected_device(),
            self.controller.connected_profile(),
        ) {
            (Some(device), Some(profile)) if &device.id == id => (device, profile),
            _ => {
                return Err(SubscriptionError::NotConnected { device: id.clone() }.into());
            }
        };

        let mask = match self.subscriptions.plan_enable(device, profile, channel)? {
            EnablePlan::AlreadyEnabled => return Ok(()),
            EnablePlan::Share(mask) => mask,
            EnablePlan::Subscribe(mask) => {
                match timeout(self.config.subscription_timeout, self.link.subscribe(id, mask)).await
                {
                    Ok(Ok(())) => mask,
                    Ok(Err(error)) => {
                        return Err(SubscriptionError::Link {
                            channel,
                            reason: error.to_string(),
                        }
                        .into())
                    }
                    Err(_) => {
                        return Err(SubscriptionError::Link {
                            channel,
                            reason: format!(
                                "no answer within {:?}",
                                self.config.subscription_timeout
                            ),
                        }
                        .into())
                    }
                }
            }
        };

        self.subscriptions.commit_enable(id, channel, mask);
        info!(device = %id, channel = %channel, characteristic = %mask, "Channel enabled");
        Ok(())
    }

    async fn disable(&mut self, id: &DeviceId, channel: Channel) -> RidelinkResult<()> {
        if !self.controller.is_connected_to(id) {
            return Err(SubscriptionError::NotConnected { device: id.clone() }.into());
        }

        match self.subscriptions.plan_disable(id, channel) {
            DisablePlan::NotEnabled => return Ok(()),
            DisablePlan::Release(_) => {}
            DisablePlan::Unsubscribe(mask) => {
                let outcome =
                    timeout(self.config.subscription_timeout, self.link.unsubscribe(id, mask)).await;
                let reason = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(error)) => Some(error.to_string()),
                    Err(_) => Some(format!(
                        "no answer within {:?}",
                        self.config.subscription_timeout
                    )),
                };
                if let Some(reason) = reason {
                    return Err(SubscriptionError::Link { channel, reason }.into());
                }
            }
        }
        self.subscriptions.commit_disable(id, channel);
        info!(device = %id, channel = %channel, "Channel disabled");
        Ok(())
    }

    /// Close every link subscription of `id`; failures are logged only
    async fn disable_all(&mut self, id: &DeviceId) {
        for mask in self.subscriptions.clear(id) {
            match timeout(self.config.subscription_timeout, self.link.unsubscribe(id, mask)).await {
                Ok(Ok(())) => debug!(device = %id, characteristic = %mask, "Unsubscribed"),
                Ok(Err(error)) => warn!(device = %id, characteristic = %mask, %error, "Unsubscribe failed"),
                Err(_) => warn!(device = %id, characteristic = %mask, "Unsubscribe timed out"),
            }
        }
    }

    fn start_ride(&mut self) -> RidelinkResult<()> {
        if self.ride.as_ref().is_some_and(RideSession::is_recording) {
            return Err(SessionError::AlreadyRecording.into());
        }

        let mut session = RideSession::new(self.config.aggregation);
        if let Some(device) = self.controller.connected_device() {
            session = session.for_device(device.id.clone());
        }
        let now = self.services.clock.now();
        session.start(now)?;
        self.ride = Some(session);

        let period = self.config.tick_interval;
        self.ticker = Some(interval_at(Instant::now() + period, period));
        info!(started_at = %now, "Ride started");
        self.bus
            .publish(SessionEvent::Ride(RideEvent::Started { at: now }));
        Ok(())
    }

    async fn stop_ride(&mut self) -> RidelinkResult<RideRecord> {
        if !self.ride.as_ref().is_some_and(RideSession::is_recording) {
            return Err(SessionError::NotRecording.into());
        }

        let location = match timeout(
            self.config.location_timeout,
            self.services.location.snapshot(),
        )
        .await
        {
            Ok(snapshot) => snapshot.into(),
            Err(_) => {
                warn!(timeout = ?self.config.location_timeout, "Location snapshot timed out");
                Location::Unknown
            }
        };
        let now = self.services.clock.now();
        let stopped = match self.ride.as_mut() {
            Some(session) => session.stop(now, location),
            None => return Err(SessionError::NotRecording.into()),
        };
        self.ticker = None;
        let record = stopped.map_err(|error| {
            error!(%error, "Ride failed verification, discarding it");
            self.ride = None;
            error
        })?;

        if let Some(id) = self.controller.connected_device().map(|d| d.id.clone()) {
            self.disable_all(&id).await;
        }

        info!(
            ride = %record.id,
            duration = %record.duration_display(),
            samples = record.sample_count(),
            "Ride finished"
        );
        self.bus
            .publish(SessionEvent::Ride(RideEvent::Finished(record.clone())));

        if let Some(sink) = &self.services.sink {
            sink.submit(record.clone(), self.services.user.clone())
                .await
                .map_err(|error| {
                    error!(ride = %record.id, %error, "Ride sink rejected record");
                    RidelinkError::Sink {
                        reason: error.to_string(),
                    }
                })?;
        }
        Ok(record)
    }

    fn status(&self) -> SessionStatus {
        let device = self.controller.active_device().cloned();
        let enabled = device
            .as_ref()
            .map(|d| self.subscriptions.enabled(&d.id))
            .unwrap_or_default();
        SessionStatus {
            scanning: self.scanner.is_scanning(),
            visible_devices: self.scanner.len(),
            connection: self.controller.state(),
            device,
            enabled,
            active_subscriptions: self.subscriptions.active_subscriptions(),
            ride: self.ride.as_ref().map(RideSession::state),
            elapsed: self
                .ride
                .as_ref()
                .map(RideSession::elapsed)
                .unwrap_or_default(),
            router: self.router.stats(),
            connections: self.controller.stats(),
        }
    }

    /// Release every resource the session holds
    async fn close(&mut self) {
        if let Err(error) = self.stop_discovery().await {
            warn!(%error, "Stop discovery during shutdown failed");
        }
        if self.ride.as_ref().is_some_and(RideSession::is_recording) {
            warn!("Shutting down with a ride in progress, discarding it");
        }
        self.ride = None;
        self.ticker = None;
        if let Some(fetch) = self.catalog_fetch.take() {
            fetch.abort();
        }
        if let Err(error) = self.disconnect().await {
            warn!(%error, "Disconnect during shutdown failed");
        }
    }

    // ------------------------------------------------------------------------
    // Link Events
    // ------------------------------------------------------------------------

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::DeviceFound(device) => {
                if !self.scanner.is_scanning() {
                    return;
                }
                if let Some(event) = self.scanner.apply_found(device) {
                    self.bus.publish(SessionEvent::Discovery(event));
                }
            }
            LinkEvent::DevicesLost(ids) => {
                if let Some(event) = self.scanner.apply_lost(ids) {
                    self.bus.publish(SessionEvent::Discovery(event));
                }
            }
            LinkEvent::Disconnected { id, reason } => {
                if let Some(device) = self.controller.link_lost(&id) {
                    self.subscriptions.clear(&id);
                    warn!(device = %id, %reason, "Link lost");
                    self.bus
                        .publish(SessionEvent::Connection(ConnectionEvent::DeviceDisconnected(
                            device,
                        )));
                }
            }
            LinkEvent::Notification {
                id,
                characteristic,
                payload,
            } => self.handle_notification(id, characteristic, payload),
        }
    }

    fn handle_notification(&mut self, id: DeviceId, characteristic: uuid::Uuid, payload: Vec<u8>) {
        if !self.controller.is_connected_to(&id) {
            debug!(device = %id, "Notification from device that is not connected");
            return;
        }

        let subscriptions = &self.subscriptions;
        let samples = self.router.route_notification(&id, &characteristic, payload, |channel| {
            subscriptions.is_enabled(&id, channel)
        });

        for sample in samples {
            if let Some(ride) = self.ride.as_mut() {
                ride.record(sample);
            }
            let event = TelemetryEvent {
                sample,
                received_at: self.services.clock.now(),
            };
            self.bus.publish(SessionEvent::Telemetry {
                device: id.clone(),
                event,
            });
        }
    }

    // ------------------------------------------------------------------------
    // Firmware Catalog
    // ------------------------------------------------------------------------

    /// Match a freshly connected device, fetching the catalog first if needed
    fn match_firmware(&mut self, device: &Device) {
        if device.firmware.is_none() {
            debug!(device = %device.id, "No firmware identity advertised");
            return;
        }
        if self.catalog.is_some() {
            self.publish_firmware_match(device);
            return;
        }
        let Some(service) = self.services.catalog.clone() else {
            return;
        };
        // An in-flight fetch matches whichever device is connected when it lands
        if self.catalog_fetch.is_some() {
            return;
        }

        let environment = self.services.environment;
        let limit = self.config.connect_timeout;
        let sender = self.catalog_sender.clone();
        debug!(%environment, "Fetching firmware catalog");
        self.catalog_fetch = Some(tokio::spawn(async move {
            let result = match timeout(limit, service.fetch_catalog(environment)).await {
                Ok(result) => result.map_err(|error| error.to_string()),
                Err(_) => Err("catalog fetch timed out".to_string()),
            };
            let _ = sender.send(CatalogFetch { result }).await;
        }));
    }

    fn handle_catalog(&mut self, fetched: CatalogFetch) {
        self.catalog_fetch = None;
        match fetched.result {
            Ok(catalog) => {
                info!(version = %catalog.version, entries = catalog.len(), "Firmware catalog loaded");
                self.catalog = Some(catalog);
            }
            Err(reason) => {
                warn!(%reason, "Firmware catalog unavailable");
                self.bus
                    .publish(SessionEvent::Firmware(FirmwareEvent::CatalogUnavailable {
                        reason,
                    }));
                return;
            }
        }

        if let Some(device) = self.controller.connected_device().cloned() {
            self.publish_firmware_match(&device);
        }
    }

    fn publish_firmware_match(&self, device: &Device) {
        let (Some(identity), Some(catalog)) = (device.firmware, &self.catalog) else {
            return;
        };
        let event = match catalog.require(identity) {
            Ok(entry) => {
                info!(device = %device.id, firmware = %entry.firmware_name, version = %entry.version, "Firmware matched");
                FirmwareEvent::Matched {
                    device: device.id.clone(),
                    entry: entry.clone(),
                }
            }
            Err(error) => {
                warn!(device = %device.id, %error, "No catalog entry for firmware");
                FirmwareEvent::Mismatch {
                    device: device.id.clone(),
                    error,
                }
            }
        };
        self.bus.publish(SessionEvent::Firmware(event));
    }

    // ------------------------------------------------------------------------
    // Ride Tick
    // ------------------------------------------------------------------------

    fn handle_tick(&mut self) {
        let elapsed = self.ride.as_mut().and_then(RideSession::tick);
        match elapsed {
            Some(elapsed) => {
                let seconds = elapsed.as_secs();
                let display = self
                    .ride
                    .as_ref()
                    .map(RideSession::elapsed_display)
                    .unwrap_or_default();
                self.bus
                    .publish(SessionEvent::Ride(RideEvent::Elapsed { seconds, display }));
            }
            None => self.ticker = None,
        }
    }
}

/// Wait for the next ride tick, or forever when no ride is recording
async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
