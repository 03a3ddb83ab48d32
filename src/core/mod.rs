//! The controller loop.
//!
//! `Core` owns every runtime collaborator and drives them from one thread:
//!
//! - signals (shutdown, durable clock changed)
//! - the sync policy (hourly resync while connected, periodic reconnect while not)
//! - the scheduler tick and dispatch to the actuator
//! - inbound peer messages that switch sunset triggers on and off
//!
//! Between passes the loop waits on the signal channel with a timeout, so a
//! signal is handled immediately. When nothing more can fire today the wait
//! stretches to the idle poll interval, but never past the next pending window
//! or the next midnight.
//!
//! Connectivity is only checked when a resync or reconnect is actually due; in
//! between the loop trusts the last known state.

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::time::Duration;

use crate::{
    actuator::{ActuatorSink, PeerMessage},
    common::utils,
    config::{self, Config},
    io::{
        lock::InstanceLock,
        signals::{SignalMessage, SignalState},
    },
    logger::Log,
    scheduler::{EventScheduler, TickOutcome},
    time::{
        TimeAuthority, TimeSource, WallClock,
        connectivity::Connectivity,
        policy::{SyncDecision, SyncPolicy},
    },
};

/// Loop timing and sync settings, resolved once from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub ntp_hosts: Vec<String>,
    pub ntp_retry_delay: Duration,
    pub enable_dst: bool,
    pub tick_interval: Duration,
    pub idle_poll_interval: Duration,
    pub resync_interval: Duration,
    pub reconnect_interval: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            ntp_hosts: config.ntp_hosts(),
            ntp_retry_delay: config.ntp_retry_delay(),
            enable_dst: config.enable_dst(),
            tick_interval: config.tick_interval(),
            idle_poll_interval: config.idle_poll_interval(),
            resync_interval: config.resync_interval(),
            reconnect_interval: config.reconnect_interval(),
        }
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Everything the loop needs, bundled to keep the constructor readable.
pub struct CoreParams {
    pub settings: LoopSettings,
    pub source: Arc<dyn TimeSource>,
    pub authority: TimeAuthority,
    pub scheduler: EventScheduler,
    pub sink: Box<dyn ActuatorSink>,
    pub connectivity: Box<dyn Connectivity>,
    pub signal_state: SignalState,
    pub debug_enabled: bool,
    pub lock: Option<InstanceLock>,
}

/// Degraded conditions reported once per change.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Health {
    time_unsynchronized: Option<bool>,
    sunset_unavailable: Option<bool>,
}

pub struct Core {
    settings: LoopSettings,
    source: Arc<dyn TimeSource>,
    authority: TimeAuthority,
    scheduler: EventScheduler,
    sink: Box<dyn ActuatorSink>,
    connectivity: Box<dyn Connectivity>,
    signal_state: SignalState,
    debug_enabled: bool,
    lock: Option<InstanceLock>,
    policy: SyncPolicy,
    online: bool,
    health: Health,
}

impl Core {
    pub fn new(params: CoreParams) -> Self {
        let policy = SyncPolicy::new(
            params.settings.resync_interval,
            params.settings.reconnect_interval,
        );

        Self {
            settings: params.settings,
            source: params.source,
            authority: params.authority,
            scheduler: params.scheduler,
            sink: params.sink,
            connectivity: params.connectivity,
            signal_state: params.signal_state,
            debug_enabled: params.debug_enabled,
            lock: params.lock,
            policy,
            online: false,
            health: Health::default(),
        }
    }

    /// Run until shutdown (or until simulated time runs out), then release
    /// the actuator and the lock.
    pub fn execute(mut self) -> Result<()> {
        if let Some(custom_dir) = config::get_custom_config_dir() {
            log_block_start!("Base directory: {}", utils::private_path(&custom_dir));
        }
        log_block_start!("Using {} actuator", self.sink.sink_name());

        self.initial_sync();
        self.main_loop()?;

        log_block_start!("Shutting down bugler...");
        self.sink.cleanup(self.debug_enabled);
        if let Some(lock) = self.lock.take() {
            if self.debug_enabled {
                log_debug!("Releasing {}", utils::private_path(lock.path()));
            }
            drop(lock);
        }
        log_end!();

        Ok(())
    }

    /// Network first when a route exists, otherwise (or when every host
    /// fails) the durable clock.
    fn initial_sync(&mut self) {
        let now = self.source.monotonic();

        self.online = self.connectivity.is_connected();
        if self.online {
            self.policy.record_sync_attempt(now);
            self.sync_network();
        } else {
            self.policy.record_reconnect_attempt(now);
            log_block_start!("No network route, reading {}", self.authority.durable_name());
            self.authority.recover_from_durable();
        }
    }

    fn main_loop(&mut self) -> Result<()> {
        while self.signal_state.running.load(Ordering::SeqCst) && !self.source.is_ended() {
            let outcome = self.run_once()?;

            let wait = if outcome.idle {
                self.settings
                    .idle_poll_interval
                    .min(Duration::from_secs(outcome.wake_within.into()))
            } else {
                self.settings.tick_interval
            };

            match self.wait(wait) {
                Some(SignalMessage::Shutdown) => break,
                Some(SignalMessage::TimeChange) => {
                    log_block_start!("Durable clock changed, re-reading it");
                    self.authority.recover_from_durable();
                }
                None => {}
            }
        }

        Ok(())
    }

    /// One pass of the loop without waiting.
    pub fn run_once(&mut self) -> Result<TickOutcome> {
        self.maintain_sync();

        let wall = self.authority.get_wall_clock(self.settings.enable_dst);
        if self.source.is_simulated() {
            Log::set_simulated_time(Some(wall.naive()));
        }

        let outcome = self
            .scheduler
            .tick(wall.seconds_past_midnight(), None, wall.date());

        if outcome.new_day {
            self.log_new_day(&wall, &outcome);
        }

        for dispatch in &outcome.dispatched {
            log_block_start!(
                "{} {}: sending \"{}\"",
                wall.time_string(),
                dispatch.trigger_id,
                dispatch.action
            );
            if let Err(e) = self.sink.dispatch(&dispatch.action) {
                log_error!("Dispatch to {} failed: {e}", self.sink.sink_name());
            }
        }

        self.handle_peer_messages();
        self.report_health(&outcome);

        Ok(outcome)
    }

    fn maintain_sync(&mut self) {
        let now = self.source.monotonic();
        let mut decision = self.policy.decide(now, self.online);

        // Confirm the route only when a resync is due
        if decision == SyncDecision::Resync && !self.connectivity.is_connected() {
            log_block_start!("Network route lost");
            self.online = false;
            decision = self.policy.decide(now, false);
        }

        match decision {
            SyncDecision::Idle => {}
            SyncDecision::Resync => {
                self.policy.record_sync_attempt(now);
                self.sync_network();
            }
            SyncDecision::Reconnect => {
                self.policy.record_reconnect_attempt(now);
                if self.connectivity.reconnect() {
                    self.online = true;
                    log_block_start!("Network route restored");
                    self.policy.record_sync_attempt(now);
                    self.sync_network();
                } else if self.debug_enabled {
                    log_pipe!();
                    log_debug!("Still no network route");
                }
            }
        }
    }

    fn sync_network(&mut self) {
        let custom = self.connectivity.custom_ntp_host();
        let hosts = TimeAuthority::host_list(custom.as_deref(), &self.settings.ntp_hosts);

        log_block_start!("Synchronizing time ({} hosts)", hosts.len());
        match self.authority.sync_now(&hosts, self.settings.ntp_retry_delay) {
            Ok(report) => {
                log_decorated!(
                    "Synchronized from {}: {} UTC",
                    report.host,
                    report.utc.format("%Y-%m-%d %H:%M:%S")
                );
                if report.mirrored {
                    log_indented!("Updated {}", self.authority.durable_name());
                }
            }
            Err(e) => {
                log_warning!("{e}");
                log_indented!("Falling back to {}", self.authority.durable_name());
                self.authority.recover_from_durable();
            }
        }
    }

    fn handle_peer_messages(&mut self) {
        for message in self.sink.poll_inbound() {
            match message {
                PeerMessage::SunsetToggle => {
                    let enabled = self.scheduler.toggle_sunset();
                    log_block_start!("Sunset triggers {}", on_off(enabled));
                }
                PeerMessage::SunsetOn => {
                    self.scheduler.set_sunset_enabled(true);
                    log_block_start!("Sunset triggers on");
                }
                PeerMessage::SunsetOff => {
                    self.scheduler.set_sunset_enabled(false);
                    log_block_start!("Sunset triggers off");
                }
                PeerMessage::Ack => {
                    if self.debug_enabled {
                        log_pipe!();
                        log_debug!("Peer acknowledged");
                    }
                }
                PeerMessage::Other(line) => {
                    if self.debug_enabled {
                        log_pipe!();
                        log_debug!("Ignoring peer line \"{line}\"");
                    }
                }
            }
        }
    }

    fn log_new_day(&self, wall: &WallClock, outcome: &TickOutcome) {
        let day = self.scheduler.table().day_number(wall.date());
        log_block_start!("New day {} (day {day})", wall.date_string());
        match outcome.sunset_minutes {
            Some(minutes) => log_indented!("Sunset at {}", utils::format_minutes(minutes)),
            None => log_indented!("No sunset entry"),
        }
        if wall.dst {
            log_indented!("Daylight saving time in effect");
        }
    }

    /// Log degraded conditions when they start and when they clear.
    fn report_health(&mut self, outcome: &TickOutcome) {
        let unsynced = !self.authority.sync_state().is_synced();
        if self.health.time_unsynchronized != Some(unsynced) {
            if unsynced {
                log_warning!("Time unsynchronized");
            } else if self.health.time_unsynchronized.is_some() {
                log_block_start!("Time synchronized ({})", self.authority.sync_state().status);
            }
            self.health.time_unsynchronized = Some(unsynced);
        }

        let wants_sunset = self
            .scheduler
            .triggers()
            .iter()
            .any(|t| t.is_sunset_relative());
        let unavailable = wants_sunset && outcome.sunset_minutes.is_none();
        if self.health.sunset_unavailable != Some(unavailable) {
            if unavailable {
                log_warning!("Sunset data unavailable, sunset triggers skipped today");
            } else if self.health.sunset_unavailable.is_some() {
                log_block_start!("Sunset data available again");
            }
            self.health.sunset_unavailable = Some(unavailable);
        }
    }

    /// Wait for `duration` or the next signal. Simulated time is advanced
    /// instantly and only already-queued signals are seen.
    fn wait(&self, duration: Duration) -> Option<SignalMessage> {
        if self.source.is_simulated() {
            self.source.sleep(duration);
            return self.signal_state.signal_receiver.try_recv().ok();
        }

        match self.signal_state.signal_receiver.recv_timeout(duration) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(SignalMessage::Shutdown),
        }
    }

    pub fn authority(&self) -> &TimeAuthority {
        &self.authority
    }

    pub fn scheduler(&self) -> &EventScheduler {
        &self.scheduler
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::RecordingSink;
    use crate::scheduler::default_triggers;
    use crate::sunset::SunsetTable;
    use crate::time::SimulatedTimeSource;
    use crate::time::SyncStatus;
    use crate::TimeError;
    use crate::time::connectivity::Offline;
    use crate::time::durable::MemoryRtc;
    use crate::time::ntp::MockNetworkTimeSource;
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    /// Link state flipped by the test. Every check is counted.
    #[derive(Clone, Default)]
    struct ScriptedLink {
        up: Arc<AtomicBool>,
        checks: Arc<AtomicUsize>,
    }

    impl ScriptedLink {
        fn new(up: bool) -> Self {
            let link = Self::default();
            link.set_up(up);
            link
        }

        fn set_up(&self, up: bool) {
            self.up.store(up, Ordering::SeqCst);
        }

        fn checks(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }
    }

    impl Connectivity for ScriptedLink {
        fn is_connected(&mut self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.up.load(Ordering::SeqCst)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn table() -> SunsetTable {
        let epoch = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        // 2025-03-01 and 2025-03-02 are days 59 and 60
        SunsetTable::parse("day,minutes\n59,1080\n60,1081\n", epoch).0
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            enable_dst: false,
            ..LoopSettings::default()
        }
    }

    fn core(
        source: Arc<SimulatedTimeSource>,
        rtc: MemoryRtc,
        network: MockNetworkTimeSource,
        sink: RecordingSink,
    ) -> Core {
        core_with_link(source, rtc, network, sink, Box::new(Offline))
    }

    fn core_with_link(
        source: Arc<SimulatedTimeSource>,
        rtc: MemoryRtc,
        network: MockNetworkTimeSource,
        sink: RecordingSink,
        connectivity: Box<dyn Connectivity>,
    ) -> Core {
        let source_dyn: Arc<dyn TimeSource> = source;
        let authority = TimeAuthority::new(
            source_dyn.clone(),
            Box::new(rtc),
            Box::new(network),
            0,
            2025,
        );
        let scheduler = EventScheduler::new(default_triggers(0, 60), table(), true, 23 * 3600 + 54 * 60);

        Core::new(CoreParams {
            settings: settings(),
            source: source_dyn,
            authority,
            scheduler,
            sink: Box::new(sink),
            connectivity,
            signal_state: SignalState::detached(),
            debug_enabled: false,
            lock: None,
        })
    }

    #[test]
    fn test_offline_day_runs_from_durable_clock() {
        let source = Arc::new(SimulatedTimeSource::new(
            start(),
            Some(start() + chrono::Duration::days(1)),
        ));
        let sink = RecordingSink::new();
        let core = core(
            source,
            MemoryRtc::with_time(start()),
            MockNetworkTimeSource::new(),
            sink.clone(),
        );

        core.execute().unwrap();

        assert_eq!(sink.codes(), vec!["2", "0", "2", "3", "1"]);
    }

    #[test]
    fn test_unsynced_without_durable_time() {
        let source = Arc::new(SimulatedTimeSource::new(start(), None));
        let mut core = core(
            source,
            MemoryRtc::new(),
            MockNetworkTimeSource::new(),
            RecordingSink::new(),
        );

        core.initial_sync();
        assert_eq!(core.authority().sync_state().status, SyncStatus::Unsynced);

        // The loop still runs on the system clock
        let outcome = core.run_once().unwrap();
        assert!(outcome.new_day);
    }

    #[test]
    fn test_peer_toggle_suppresses_sunset_triggers() {
        let source = Arc::new(SimulatedTimeSource::new(start(), None));
        let sink = RecordingSink::new();
        let mut core = core(
            source.clone(),
            MemoryRtc::with_time(start()),
            MockNetworkTimeSource::new(),
            sink.clone(),
        );
        core.initial_sync();

        sink.push_inbound(PeerMessage::SunsetToggle);
        core.run_once().unwrap();
        assert!(!core.scheduler().sunset_enabled());

        // 17:55:00 is inside the sunset-relative first call window
        source.advance(Duration::from_secs(1075 * 60));
        core.run_once().unwrap();
        assert!(sink.codes().is_empty());

        // Re-enable after that window closed; only retreat at 18:00 remains
        source.advance(Duration::from_secs(60));
        sink.push_inbound(PeerMessage::SunsetOn);
        core.run_once().unwrap();
        assert!(core.scheduler().sunset_enabled());
        source.advance(Duration::from_secs(4 * 60));
        core.run_once().unwrap();
        assert_eq!(sink.codes(), vec!["3"]);
    }

    #[test]
    fn test_time_change_signal_rereads_durable_clock() {
        let source = Arc::new(SimulatedTimeSource::new(
            start(),
            Some(start() + chrono::Duration::minutes(10)),
        ));
        let rtc = MemoryRtc::new();
        let sink = RecordingSink::new();
        let mut core = core(source, rtc.clone(), MockNetworkTimeSource::new(), sink.clone());

        // The durable clock was empty at startup; `set-time` fills it and signals
        rtc.preset(Utc.with_ymd_and_hms(2025, 3, 1, 7, 55, 0).unwrap());
        core.signal_state
            .signal_sender
            .send(SignalMessage::TimeChange)
            .unwrap();

        core.main_loop().unwrap();

        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedDurable);
        assert_eq!(sink.codes(), vec!["2", "0"]);
    }

    #[test]
    fn test_initial_sync_over_network_mirrors_to_durable() {
        let served = Utc.with_ymd_and_hms(2025, 3, 1, 7, 0, 0).unwrap();
        let mut network = MockNetworkTimeSource::new();
        network.expect_query().times(1).returning(move |_| Ok(served));

        let source = Arc::new(SimulatedTimeSource::new(start(), None));
        let rtc = MemoryRtc::new();
        let link = ScriptedLink::new(true);
        let mut core = core_with_link(
            source.clone(),
            rtc.clone(),
            network,
            RecordingSink::new(),
            Box::new(link.clone()),
        );

        core.initial_sync();
        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedNetwork);
        assert_eq!(core.authority().sync_state().source.as_deref(), Some("pool.ntp.org"));
        assert_eq!(rtc.stored(), Some(served));

        // Within the resync interval the route is neither checked nor used
        for _ in 0..30 {
            source.advance(Duration::from_secs(60));
            core.run_once().unwrap();
        }
        assert_eq!(link.checks(), 1);
    }

    #[test]
    fn test_exhausted_sync_falls_back_to_durable_and_waits_an_hour() {
        let mut network = MockNetworkTimeSource::new();
        network
            .expect_query()
            .times(8)
            .returning(|h| Err(TimeError::transient(h, "unreachable")));

        let source = Arc::new(SimulatedTimeSource::new(start(), None));
        let link = ScriptedLink::new(true);
        let mut core = core_with_link(
            source.clone(),
            MemoryRtc::with_time(start()),
            network,
            RecordingSink::new(),
            Box::new(link.clone()),
        );

        // All four hosts fail; the loop itself reads the durable clock
        core.initial_sync();
        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedDurable);

        // The failed attempt still counts, so nothing is retried for an hour
        source.advance(Duration::from_secs(30 * 60));
        core.run_once().unwrap();
        assert_eq!(link.checks(), 1);

        source.advance(Duration::from_secs(31 * 60));
        core.run_once().unwrap();
        core.run_once().unwrap();
        assert_eq!(link.checks(), 2);
        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedDurable);
    }

    #[test]
    fn test_reconnect_is_followed_by_immediate_sync() {
        let served = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let mut network = MockNetworkTimeSource::new();
        network.expect_query().times(1).returning(move |_| Ok(served));

        let source = Arc::new(SimulatedTimeSource::new(start(), None));
        let link = ScriptedLink::new(false);
        let mut core = core_with_link(
            source.clone(),
            MemoryRtc::with_time(start()),
            network,
            RecordingSink::new(),
            Box::new(link.clone()),
        );

        core.initial_sync();
        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedDurable);

        // The link comes back, but the reconnect interval has not passed yet
        link.set_up(true);
        source.advance(Duration::from_secs(10 * 60));
        core.run_once().unwrap();
        assert_eq!(link.checks(), 1);
        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedDurable);

        source.advance(Duration::from_secs(21 * 60));
        core.run_once().unwrap();
        assert_eq!(link.checks(), 2);
        assert_eq!(core.authority().sync_state().status, SyncStatus::SyncedNetwork);
        assert_eq!(core.authority().sync_state().source.as_deref(), Some("pool.ntp.org"));
    }
}
