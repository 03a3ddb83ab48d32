//! Controller coordinator that manages the complete lifecycle of bugler.
//!
//! This module handles resource acquisition and hands everything to [`Core`]:
//! - Configuration loading
//! - Lock file management for single-instance enforcement
//! - Signal handler setup
//! - Sunset dataset loading
//! - Clock, network and actuator construction
//!
//! The builder supports the contexts the controller starts in:
//! - Normal startup: `Bugler::new(debug_enabled).run()`
//! - Simulation: `Bugler::new(false).without_lock().with_time_source(..).with_sink(..).run()`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use crate::{
    actuator::{ActuatorSink, create_sink},
    config::{self, Config},
    core::{Core, CoreParams, LoopSettings},
    io::{
        lock,
        signals::{SignalState, setup_signal_handler},
    },
    scheduler::EventScheduler,
    sunset::SunsetTable,
    time::{
        RealTimeSource, TimeAuthority, TimeSource,
        connectivity::{Connectivity, RouteProbe},
        durable::{DurableClock, LinuxRtc},
        ntp::{NetworkTimeSource, SntpClient},
    },
};

/// Builder for configuring and running the controller.
///
/// Every hardware collaborator can be replaced before `run`, which is how the
/// simulator swaps in simulated time, an in-memory clock and sink, and no
/// network.
///
/// # Examples
///
/// ```no_run
/// use bugler::Bugler;
///
/// # fn main() -> anyhow::Result<()> {
/// Bugler::new(false).run()?;
/// # Ok(())
/// # }
/// ```
pub struct Bugler {
    debug_enabled: bool,
    create_lock: bool,
    show_headers: bool,
    config: Option<Config>,
    time_source: Option<Arc<dyn TimeSource>>,
    durable: Option<Box<dyn DurableClock>>,
    network: Option<Box<dyn NetworkTimeSource>>,
    connectivity: Option<Box<dyn Connectivity>>,
    sink: Option<Box<dyn ActuatorSink>>,
}

impl Bugler {
    /// Create a new runner with defaults matching a normal run
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            debug_enabled,
            create_lock: true,
            show_headers: true,
            config: None,
            time_source: None,
            durable: None,
            network: None,
            connectivity: None,
            sink: None,
        }
    }

    /// Skip lock file creation (simulation never touches hardware)
    pub fn without_lock(mut self) -> Self {
        self.create_lock = false;
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Use this configuration instead of loading `bugler.toml`
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.time_source = Some(source);
        self
    }

    pub fn with_durable_clock(mut self, durable: Box<dyn DurableClock>) -> Self {
        self.durable = Some(durable);
        self
    }

    pub fn with_network(mut self, network: Box<dyn NetworkTimeSource>) -> Self {
        self.network = Some(network);
        self
    }

    pub fn with_connectivity(mut self, connectivity: Box<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn ActuatorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Execute the controller with the configured settings.
    ///
    /// Returns when a shutdown signal arrives or simulated time runs out.
    pub fn run(self) -> Result<()> {
        if self.show_headers {
            log_version!();
        }

        let (config, config_path) = match self.config {
            Some(config) => (config, None),
            None => {
                let config = Config::load()?;
                (config, Some(config::get_config_path()?))
            }
        };

        let lock = if self.create_lock {
            match lock::acquire_lock()? {
                Some(lock) => Some(lock),
                None => {
                    let holder = lock::get_running_instance()
                        .ok()
                        .flatten()
                        .map(|info| format!(" (PID {})", info.pid))
                        .unwrap_or_default();
                    anyhow::bail!("bugler is already running{holder}");
                }
            }
        } else {
            None
        };

        let source: Arc<dyn TimeSource> = self
            .time_source
            .unwrap_or_else(|| Arc::new(RealTimeSource::new()));

        // Simulated runs never receive OS signals
        let signal_state = if source.is_simulated() {
            SignalState::detached()
        } else {
            setup_signal_handler(self.debug_enabled)?
        };

        config.log_config(config_path.as_deref());

        let config_dir = config::loading::get_config_base_dir().unwrap_or_else(|_| PathBuf::from("."));
        let epoch = config.epoch()?;
        let table = SunsetTable::load_or_empty(&config.sunset_data_path(&config_dir), epoch);

        let triggers = config
            .trigger_definitions()
            .context("Failed to resolve triggers")?;
        log_block_start!("Daily programme ({} triggers)", triggers.len());
        for trigger in &triggers {
            log_indented!(
                "{:<20} {:<12} sends \"{}\"",
                trigger.id,
                trigger.describe(),
                trigger.action
            );
        }

        let scheduler = EventScheduler::new(
            triggers,
            table,
            config.sunset_triggers_enabled(),
            config.late_cutoff_seconds()?,
        );

        let durable = self
            .durable
            .unwrap_or_else(|| Box::new(LinuxRtc::new(config.rtc_device())));
        let network = self
            .network
            .unwrap_or_else(|| Box::new(SntpClient::new(config.ntp_timeout())));
        let authority = TimeAuthority::new(
            Arc::clone(&source),
            durable,
            network,
            config.utc_offset_seconds()?,
            config.min_plausible_year(),
        );

        let connectivity = self.connectivity.unwrap_or_else(|| {
            Box::new(RouteProbe::new(
                config.connectivity_probe(),
                config.ntp_custom_host.clone(),
            ))
        });

        let sink = match self.sink {
            Some(sink) => sink,
            None => create_sink(&config, self.debug_enabled)?,
        };

        if lock.is_some() {
            log_block_start!("Lock acquired, starting bugler...");
        }

        let core = Core::new(CoreParams {
            settings: LoopSettings::from_config(&config),
            source,
            authority,
            scheduler,
            sink,
            connectivity,
            signal_state,
            debug_enabled: self.debug_enabled,
            lock,
        });

        core.execute()
    }
}
