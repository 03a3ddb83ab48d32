//! Configuration system for bugler.
//!
//! Settings live in `bugler.toml`, found in `$XDG_CONFIG_HOME/bugler/` or in
//! the directory given with `--config`. Every field is optional; missing values
//! fall back to the defaults in `common::constants`. A commented default file
//! is written on first run.
//!
//! ```toml
//! #[Clock]
//! utc_offset = "-08:00"          # Fixed offset from UTC (±HH:MM)
//! enable_dst = true              # Apply US daylight saving rules
//! rtc_device = "/dev/rtc0"       # Battery-backed hardware clock
//!
//! #[Network time]
//! ntp_hosts = ["pool.ntp.org", "time.google.com"]
//! ntp_custom_host = "ntp.lan"    # Tried before the list
//! resync_interval = 3600         # Seconds between resyncs while online
//!
//! #[Sunset]
//! sunset_data = "sunset_data.csv"
//! epoch_start = "2025-01-01"
//!
//! #[Actuator]
//! sink = "serial"                # "serial" or "recorder"
//! serial_device = "/dev/ttyS1"
//!
//! [[trigger]]
//! id = "retreat"
//! sunset_offset = 0
//! action = "3"
//! ```
//!
//! When no `[[trigger]]` tables are present the built-in daily programme is
//! used, with windows suited to the selected sink.

pub mod builder;
pub mod loading;
pub mod validation;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::constants::*;
use crate::common::utils::{format_seconds, private_path};
use crate::scheduler::{TriggerDefinition, default_triggers};

pub use builder::create_default_config;
pub use loading::{get_config_path, get_custom_config_dir, load, load_from_path, set_config_dir};

/// Where dispatched actions go.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Peer microcontroller on a tty, one code per line
    Serial,
    /// External recorder command bracketing a recording
    Recorder,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Serial => "serial",
            SinkKind::Recorder => "recorder",
        }
    }

    /// Default `(early, window)` seconds for triggers that do not set them.
    pub fn default_window(&self) -> (u32, u32) {
        match self {
            SinkKind::Serial => (SERIAL_EARLY_SECONDS, SERIAL_WINDOW_SECONDS),
            SinkKind::Recorder => (RECORDER_EARLY_SECONDS, RECORDER_WINDOW_SECONDS),
        }
    }
}

/// One `[[trigger]]` table.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct TriggerConfig {
    pub id: String,
    /// Fixed local time, `HH:MM`
    pub at: Option<String>,
    /// Minutes relative to today's sunset (negative is before)
    pub sunset_offset: Option<i32>,
    pub action: String,
    pub early_seconds: Option<u32>,
    pub window_seconds: Option<u32>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct Config {
    // Clock
    pub utc_offset: Option<String>,
    pub enable_dst: Option<bool>,
    pub min_plausible_year: Option<i32>,
    pub rtc_device: Option<String>,

    // Network time
    pub ntp_hosts: Option<Vec<String>>,
    pub ntp_custom_host: Option<String>,
    pub ntp_retry_delay: Option<u64>, // seconds between hosts
    pub ntp_timeout: Option<u64>,     // seconds per host
    pub resync_interval: Option<u64>, // seconds
    pub reconnect_interval: Option<u64>,
    pub connectivity_probe: Option<String>,

    // Sunset data
    pub sunset_data: Option<String>,
    pub epoch_start: Option<String>,

    // Scheduler
    pub tick_interval_ms: Option<u64>,
    pub idle_poll_interval: Option<u64>, // seconds
    pub late_night_cutoff: Option<String>,
    pub sunset_triggers: Option<bool>,

    // Actuator
    pub sink: Option<SinkKind>,
    pub serial_device: Option<String>,
    pub baud_rate: Option<u32>,
    pub recorder_command: Option<String>,
    pub recorder_durations: Option<BTreeMap<String, u64>>,

    #[serde(rename = "trigger")]
    pub triggers: Option<Vec<TriggerConfig>>,
}

/// Parse `±HH:MM` into signed seconds east of UTC.
pub fn parse_utc_offset(value: &str) -> Result<i32> {
    let value = value.trim();
    let (sign, rest) = match value.chars().next() {
        Some('+') => (1, &value[1..]),
        Some('-') => (-1, &value[1..]),
        _ => anyhow::bail!("utc_offset '{value}' must start with + or -"),
    };
    let (hours, minutes) = rest
        .split_once(':')
        .with_context(|| format!("utc_offset '{value}' must look like -08:00"))?;
    let hours: i32 = hours
        .parse()
        .with_context(|| format!("utc_offset '{value}' has a bad hour"))?;
    let minutes: i32 = minutes
        .parse()
        .with_context(|| format!("utc_offset '{value}' has a bad minute"))?;
    if !(0..60).contains(&minutes) {
        anyhow::bail!("utc_offset '{value}' minutes must be 0-59");
    }
    Ok(sign * (hours * 3600 + minutes * 60))
}

/// Parse `HH:MM` or `HH:MM:SS` into seconds past midnight.
pub fn parse_clock_time(value: &str) -> Result<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value.trim(), "%H:%M"))
        .with_context(|| format!("'{value}' is not a valid time, use HH:MM"))?;
    Ok(time.num_seconds_from_midnight())
}

impl Config {
    /// Load configuration using the module's load function
    pub fn load() -> Result<Self> {
        load()
    }

    pub fn utc_offset_seconds(&self) -> Result<i32> {
        parse_utc_offset(self.utc_offset.as_deref().unwrap_or(DEFAULT_UTC_OFFSET))
    }

    pub fn enable_dst(&self) -> bool {
        self.enable_dst.unwrap_or(DEFAULT_ENABLE_DST)
    }

    pub fn min_plausible_year(&self) -> i32 {
        self.min_plausible_year.unwrap_or(DEFAULT_MIN_PLAUSIBLE_YEAR)
    }

    pub fn rtc_device(&self) -> &str {
        self.rtc_device.as_deref().unwrap_or(DEFAULT_RTC_DEVICE)
    }

    pub fn ntp_hosts(&self) -> Vec<String> {
        match &self.ntp_hosts {
            Some(hosts) => hosts.clone(),
            None => DEFAULT_NTP_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }

    pub fn ntp_retry_delay(&self) -> Duration {
        Duration::from_secs(self.ntp_retry_delay.unwrap_or(DEFAULT_NTP_RETRY_DELAY))
    }

    pub fn ntp_timeout(&self) -> Duration {
        Duration::from_secs(self.ntp_timeout.unwrap_or(DEFAULT_NTP_TIMEOUT))
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval.unwrap_or(DEFAULT_RESYNC_INTERVAL))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval.unwrap_or(DEFAULT_RECONNECT_INTERVAL))
    }

    pub fn connectivity_probe(&self) -> &str {
        self.connectivity_probe
            .as_deref()
            .unwrap_or(DEFAULT_CONNECTIVITY_PROBE)
    }

    /// Dataset path. Relative paths resolve against the config directory.
    pub fn sunset_data_path(&self, config_dir: &Path) -> PathBuf {
        let path = PathBuf::from(self.sunset_data.as_deref().unwrap_or(DEFAULT_SUNSET_DATA));
        if path.is_absolute() {
            path
        } else {
            config_dir.join(path)
        }
    }

    pub fn epoch(&self) -> Result<NaiveDate> {
        let value = self.epoch_start.as_deref().unwrap_or(DEFAULT_EPOCH_START);
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .with_context(|| format!("epoch_start '{value}' must be YYYY-MM-DD"))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.unwrap_or(DEFAULT_TICK_INTERVAL_MS))
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_secs(self.idle_poll_interval.unwrap_or(DEFAULT_IDLE_POLL_INTERVAL))
    }

    pub fn late_cutoff_seconds(&self) -> Result<u32> {
        parse_clock_time(
            self.late_night_cutoff
                .as_deref()
                .unwrap_or(DEFAULT_LATE_NIGHT_CUTOFF),
        )
        .context("Invalid late_night_cutoff")
    }

    pub fn sunset_triggers_enabled(&self) -> bool {
        self.sunset_triggers.unwrap_or(DEFAULT_SUNSET_TRIGGERS)
    }

    pub fn sink(&self) -> SinkKind {
        self.sink.unwrap_or(SinkKind::Serial)
    }

    pub fn serial_device(&self) -> &str {
        self.serial_device.as_deref().unwrap_or(DEFAULT_SERIAL_DEVICE)
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }

    pub fn recorder_command(&self) -> &str {
        self.recorder_command
            .as_deref()
            .unwrap_or(DEFAULT_RECORDER_COMMAND)
    }

    /// Recording length per action code, defaults overlaid by the config map.
    pub fn recording_durations(&self) -> BTreeMap<String, Duration> {
        let mut durations: BTreeMap<String, Duration> = DEFAULT_RECORDING_DURATIONS
            .iter()
            .map(|(code, secs)| (code.to_string(), Duration::from_secs(*secs)))
            .collect();
        if let Some(overrides) = &self.recorder_durations {
            for (code, secs) in overrides {
                durations.insert(code.clone(), Duration::from_secs(*secs));
            }
        }
        durations
    }

    /// Resolve the trigger tables, or the default programme when none are set.
    pub fn trigger_definitions(&self) -> Result<Vec<TriggerDefinition>> {
        let (default_early, default_window) = self.sink().default_window();

        let Some(triggers) = &self.triggers else {
            return Ok(default_triggers(default_early, default_window));
        };

        triggers
            .iter()
            .map(|t| {
                let definition = match (&t.at, t.sunset_offset) {
                    (Some(at), None) => {
                        let seconds = parse_clock_time(at)
                            .with_context(|| format!("trigger '{}'", t.id))?;
                        TriggerDefinition::fixed(&t.id, seconds / 60, &t.action)
                    }
                    (None, Some(offset)) => TriggerDefinition::sunset(&t.id, offset, &t.action),
                    _ => anyhow::bail!(
                        "trigger '{}' needs exactly one of 'at' or 'sunset_offset'",
                        t.id
                    ),
                };
                Ok(definition.with_window(
                    t.early_seconds.unwrap_or(default_early),
                    t.window_seconds.unwrap_or(default_window),
                ))
            })
            .collect()
    }

    pub fn log_config(&self, config_path: Option<&Path>) {
        match config_path {
            Some(path) => log_block_start!("Loaded configuration from {}", private_path(path)),
            None => log_block_start!("Using built-in configuration"),
        }

        log_indented!(
            "Clock: UTC{} (DST {})",
            self.utc_offset.as_deref().unwrap_or(DEFAULT_UTC_OFFSET),
            if self.enable_dst() { "on" } else { "off" }
        );
        log_indented!("Hardware clock: {}", self.rtc_device());
        log_indented!("Time servers: {}", self.ntp_hosts().join(", "));
        if let Some(custom) = &self.ntp_custom_host {
            log_indented!("Custom time server: {custom}");
        }

        match self.sink() {
            SinkKind::Serial => log_indented!(
                "Actuator: serial {} @ {} baud",
                self.serial_device(),
                self.baud_rate()
            ),
            SinkKind::Recorder => {
                log_indented!("Actuator: recorder '{}'", self.recorder_command())
            }
        }

        if let Ok(triggers) = self.trigger_definitions() {
            let source = if self.triggers.is_some() {
                "configured"
            } else {
                "default"
            };
            log_indented!("Triggers ({source}):");
            for trigger in &triggers {
                log_indented!(
                    "  {} at {} -> \"{}\" (-{}s/+{}s)",
                    trigger.id,
                    trigger.describe(),
                    trigger.action,
                    trigger.early_offset_seconds,
                    trigger.window_length_seconds
                );
            }
        }

        if !self.sunset_triggers_enabled() {
            log_indented!("Sunset triggers start disabled");
        }
        if let Ok(cutoff) = self.late_cutoff_seconds() {
            log_indented!("Late-night cutoff: {}", format_seconds(cutoff as i64));
        }
    }
}
