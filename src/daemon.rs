//! Reconciliation daemon
//!
//! Owns the monitored configuration and drives the pipeline
//! load → match → resolve modes → correct positions → apply.
//! Everything runs on one task fed by a single event channel. Backend applies
//! complete asynchronously and come back as [`Event::Applied`]; while one is in
//! flight, further applies only mark the state dirty and are replayed once with
//! the latest configuration when it completes.

use anyhow::{anyhow, Context, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::control::ControlConfig;
use crate::matcher::{read_in_defaults, read_in_global};
use crate::output::LiveConfig;
use crate::rotation::{set_device_orientation, Orientation, OrientationSensor};
use crate::store::global::GlobalStore;
use crate::store::{ConfigStore, DeviceState};
use crate::types::Position;

/// Capacity of the daemon event channel
const EVENT_QUEUE: usize = 100;

/// Display backend: enumerates outputs and applies configurations
pub trait Backend {
    /// Current configuration
    fn get(&self) -> oneshot::Receiver<Result<LiveConfig>>;
    /// Apply `config`; the receiver resolves once the backend is done
    fn set(&self, config: LiveConfig) -> oneshot::Receiver<Result<()>>;
    /// Whether `config` is acceptable to the backend
    fn can_apply(&self, config: &LiveConfig) -> bool;
}

#[derive(Debug)]
pub enum Event {
    /// Outputs were plugged or unplugged
    OutputsChanged,
    /// The backend reports a new configuration state
    ConfigurationChanged(LiveConfig),
    Orientation(Orientation),
    OrientationAvailable(bool),
    TabletMode(bool),
    LidChanged { closed: bool },
    SetAutoRotate(bool),
    /// Completion of a backend apply
    Applied(Result<()>),
    Shutdown,
}

/// Fill `live` from global records or defaults and place its enabled outputs
/// left to right. Used when no snapshot exists for the topology.
pub fn ideal_config(live: &LiveConfig, globals: &GlobalStore) -> LiveConfig {
    let mut config = live.clone();
    for output in &mut config.outputs {
        if !read_in_global(output, globals) {
            read_in_defaults(output);
        }
    }

    let mut x: i32 = 0;
    for output in config.outputs.iter_mut().filter(|o| o.is_positionable()) {
        output.position = Position::new(x, 0);
        x = x.saturating_add(output.geometry().width);
    }
    if config.primary_output().is_none() {
        let first = config.outputs.iter().find(|o| o.is_positionable()).map(|o| o.id);
        if let Some(id) = first {
            config.set_primary_output(id);
        }
    }
    config.update_screen_size();
    config
}

pub struct Daemon<B: Backend> {
    backend: B,
    store: ConfigStore,
    device: DeviceState,
    sensor: OrientationSensor,
    monitored: LiveConfig,
    /// Backend changes are tracked (no apply of ours in flight)
    monitoring: bool,
    /// Configuration handed to the backend and not yet acknowledged
    in_flight: Option<LiveConfig>,
    dirty: bool,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
}

impl<B: Backend> Daemon<B> {
    pub fn new(backend: B, store: ConfigStore, device: DeviceState) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        Self {
            backend,
            store,
            device,
            sensor: OrientationSensor::default(),
            monitored: LiveConfig::default(),
            monitoring: false,
            in_flight: None,
            dirty: false,
            events_tx,
            events_rx,
        }
    }

    /// Sender for feeding events from other threads or tasks
    pub fn sender(&self) -> mpsc::Sender<Event> {
        self.events_tx.clone()
    }

    pub fn monitored(&self) -> &LiveConfig {
        &self.monitored
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn is_applying(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn sensor(&self) -> OrientationSensor {
        self.sensor
    }

    async fn fetch(&self) -> Result<LiveConfig> {
        self.backend
            .get()
            .await
            .context("Backend dropped the configuration request")?
    }

    /// Fetch the live configuration and apply the stored layout for it
    pub async fn start(&mut self) -> Result<()> {
        let live = self.fetch().await.context("Failed to fetch initial configuration")?;
        info!(outputs = live.outputs.len(), topology = %live.topology_id(), "Initial configuration ready");
        self.apply_config(live);
        Ok(())
    }

    pub async fn next_event(&mut self) -> Option<Event> {
        self.events_rx.recv().await
    }

    /// Run until [`Event::Shutdown`]
    pub async fn run(mut self) -> Result<()> {
        self.start().await?;
        while let Some(event) = self.next_event().await {
            if matches!(event, Event::Shutdown) {
                info!("Shutting down");
                break;
            }
            self.handle_event(event).await;
        }
        Ok(())
    }

    pub async fn handle_event(&mut self, event: Event) {
        match event {
            Event::OutputsChanged => match self.fetch().await {
                Ok(live) => {
                    info!(topology = %live.topology_id(), "Outputs changed");
                    self.apply_config(live);
                }
                Err(e) => warn!(error = ?e, "Failed to fetch configuration after output change"),
            },
            Event::ConfigurationChanged(config) => self.configuration_changed(config),
            Event::Orientation(orientation) => {
                self.sensor.value = orientation;
                self.update_orientation();
            }
            Event::OrientationAvailable(available) => {
                self.sensor.available = available;
                self.update_orientation();
            }
            Event::TabletMode(engaged) => {
                self.monitored.tablet_mode_engaged = engaged;
                self.update_orientation();
            }
            Event::LidChanged { closed } => self.lid_changed(closed).await,
            Event::SetAutoRotate(value) => self.set_auto_rotate(value),
            Event::Applied(result) => self.applied(result),
            Event::Shutdown => {}
        }
    }

    /// Control settings of the monitored topology
    pub fn control(&self) -> ControlConfig {
        ControlConfig::load(self.store.control_path(&self.monitored.topology_id()))
    }

    /// All panels follow the orientation sensor
    pub fn auto_rotate(&self) -> bool {
        self.control().all_panels_auto_rotate(&self.monitored)
    }

    fn set_auto_rotate(&mut self, value: bool) {
        let mut control = self.control();
        if let Err(e) = control.set_panels_auto_rotate(&self.monitored, value) {
            warn!(error = ?e, "Failed to store auto-rotate setting");
        }
        self.sensor.enabled = value;
        info!(enabled = value, "Auto-rotate changed");
    }

    /// Stored layout for `live`, or the ideal layout when none applies
    fn read_config(&self, live: &LiveConfig) -> Option<LiveConfig> {
        let backend = &self.backend;
        if let Some(config) = self.store.read_config(live, self.device, |c| backend.can_apply(c)) {
            info!(topology = %live.topology_id(), "Using stored config");
            return Some(config);
        }
        let config = ideal_config(live, self.store.globals());
        if !backend.can_apply(&config) {
            return None;
        }
        info!(topology = %live.topology_id(), "No stored config, using ideal config");
        Some(config)
    }

    fn apply_config(&mut self, live: LiveConfig) {
        let Some(mut config) = self.read_config(&live) else {
            warn!(topology = %live.topology_id(), "No applicable config for the connected outputs");
            self.monitored = live;
            self.monitoring = self.in_flight.is_none();
            return;
        };

        let control = ControlConfig::load(self.store.control_path(&config.topology_id()));
        self.sensor.enabled = control.auto_rotation_requested(&config);
        if let Some(orientation) = self.sensor.reading(config.features) {
            set_device_orientation(&mut config, &control, orientation);
        }
        self.do_apply_config(config);
    }

    fn update_orientation(&mut self) {
        let Some(orientation) = self.sensor.reading(self.monitored.features) else {
            return;
        };
        let mut config = self.monitored.clone();
        set_device_orientation(&mut config, &self.control(), orientation);
        if config == self.monitored {
            debug!(orientation = %orientation, "Orientation needs no change");
            return;
        }
        self.do_apply_config(config);
    }

    fn do_apply_config(&mut self, config: LiveConfig) {
        self.monitored = config;
        if self.in_flight.is_some() {
            debug!("Apply in flight, deferring");
            self.dirty = true;
            return;
        }
        self.refresh_config();
    }

    fn refresh_config(&mut self) {
        self.monitoring = false;
        self.dirty = false;
        debug!(topology = %self.monitored.topology_id(), "Applying config");

        self.in_flight = Some(self.monitored.clone());
        let result = self.backend.set(self.monitored.clone());
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = match result.await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("Backend dropped the apply request")),
            };
            let _ = events.send(Event::Applied(result)).await;
        });
    }

    fn applied(&mut self, result: Result<()>) {
        let Some(applied) = self.in_flight.take() else {
            debug!("Ignoring stray apply completion");
            return;
        };

        // Only what the backend acknowledged is persisted, never a queued follow-up
        match result {
            Ok(()) => {
                info!("Config applied");
                if let Err(e) = self.store.save(&applied) {
                    warn!(error = ?e, "Failed to save applied config");
                }
            }
            Err(e) => warn!(error = ?e, "Failed to apply config"),
        }

        if self.dirty {
            // Changed again in the meantime
            self.refresh_config();
        } else {
            self.monitoring = true;
        }
    }

    fn configuration_changed(&mut self, config: LiveConfig) {
        if !self.monitoring {
            debug!("Ignoring configuration change while applying");
            return;
        }
        info!(topology = %config.topology_id(), "Configuration changed, saving");
        self.monitored = config;
        if let Err(e) = self.store.save(&self.monitored) {
            warn!(error = ?e, "Failed to save changed config");
        }
        self.update_orientation();
    }

    async fn lid_changed(&mut self, closed: bool) {
        self.device.lid_closed = closed;
        if !self.device.is_laptop {
            return;
        }

        if !closed {
            info!("Lid opened");
            match self.fetch().await {
                Ok(live) => self.apply_config(live),
                Err(e) => warn!(error = ?e, "Failed to fetch configuration after lid open"),
            }
            return;
        }

        info!("Lid closed");
        let external = self
            .monitored
            .outputs
            .iter()
            .any(|o| o.is_positionable() && !o.output_type.is_panel());
        if !external {
            debug!("No external output, keeping panels enabled");
            return;
        }
        if let Err(e) = self.store.save_lid_opened(&self.monitored) {
            warn!(error = ?e, "Failed to save lid opened config");
        }

        let mut config = self.monitored.clone();
        for output in config.outputs.iter_mut().filter(|o| o.output_type.is_panel()) {
            output.enabled = false;
            output.primary = false;
        }
        if config.primary_output().is_none() {
            let first = config.outputs.iter().find(|o| o.is_positionable()).map(|o| o.id);
            if let Some(id) = first {
                config.set_primary_output(id);
            }
        }
        self.do_apply_config(config);
    }
}
