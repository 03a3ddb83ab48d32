//! Default configuration file generation.
//!
//! The generated file lists every setting with its default and a comment
//! aligned in one column, and spells out the default trigger programme so it
//! can be edited in place.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::common::constants::*;
use crate::common::utils::private_path;

/// Write a commented default `bugler.toml` at `path`.
pub fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    let content = default_config_content();
    fs::write(path, content)
        .with_context(|| format!("Failed to write default config to {}", private_path(path)))?;

    log_block_start!("Created default configuration: {}", private_path(path));
    Ok(())
}

pub(crate) fn default_config_content() -> String {
    let hosts = DEFAULT_NTP_HOSTS
        .iter()
        .map(|h| format!("\"{h}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let settings = ConfigBuilder::new()
        .add_section("Clock")
        .add_setting(
            "utc_offset",
            &format!("\"{DEFAULT_UTC_OFFSET}\""),
            "Fixed offset from UTC (±HH:MM, within ±14:00)",
        )
        .add_setting(
            "enable_dst",
            &DEFAULT_ENABLE_DST.to_string(),
            "Apply US daylight saving time rules",
        )
        .add_setting(
            "min_plausible_year",
            &DEFAULT_MIN_PLAUSIBLE_YEAR.to_string(),
            "Hardware clock years before this are treated as corrupt",
        )
        .add_setting(
            "rtc_device",
            &format!("\"{DEFAULT_RTC_DEVICE}\""),
            "Battery-backed hardware clock device",
        )
        .add_section("Network time")
        .add_setting("ntp_hosts", &format!("[{hosts}]"), "Tried in order")
        .add_setting(
            "ntp_retry_delay",
            &DEFAULT_NTP_RETRY_DELAY.to_string(),
            &format!("Seconds between hosts (0-{MAXIMUM_NTP_RETRY_DELAY})"),
        )
        .add_setting(
            "ntp_timeout",
            &DEFAULT_NTP_TIMEOUT.to_string(),
            &format!("Seconds to wait per host ({MINIMUM_NTP_TIMEOUT}-{MAXIMUM_NTP_TIMEOUT})"),
        )
        .add_setting(
            "resync_interval",
            &DEFAULT_RESYNC_INTERVAL.to_string(),
            "Seconds between resyncs while online",
        )
        .add_setting(
            "reconnect_interval",
            &DEFAULT_RECONNECT_INTERVAL.to_string(),
            "Seconds between connectivity checks while offline",
        )
        .add_setting(
            "connectivity_probe",
            &format!("\"{DEFAULT_CONNECTIVITY_PROBE}\""),
            "host:port used to detect a usable network",
        )
        .add_section("Sunset")
        .add_setting(
            "sunset_data",
            &format!("\"{DEFAULT_SUNSET_DATA}\""),
            "CSV of day,minutes (relative to this directory)",
        )
        .add_setting(
            "epoch_start",
            &format!("\"{DEFAULT_EPOCH_START}\""),
            "Date of day number 0 in the dataset",
        )
        .add_section("Scheduler")
        .add_setting(
            "tick_interval_ms",
            &DEFAULT_TICK_INTERVAL_MS.to_string(),
            &format!(
                "Loop cadence ({MINIMUM_TICK_INTERVAL_MS}-{MAXIMUM_TICK_INTERVAL_MS})ms"
            ),
        )
        .add_setting(
            "idle_poll_interval",
            &DEFAULT_IDLE_POLL_INTERVAL.to_string(),
            "Seconds between polls once the day is done",
        )
        .add_setting(
            "late_night_cutoff",
            &format!("\"{DEFAULT_LATE_NIGHT_CUTOFF}\""),
            "After this local time the day counts as done",
        )
        .add_setting(
            "sunset_triggers",
            &DEFAULT_SUNSET_TRIGGERS.to_string(),
            "Start with sunset-relative triggers enabled",
        )
        .add_section("Actuator")
        .add_setting(
            "sink",
            &format!("\"{DEFAULT_SINK}\""),
            "Select: \"serial\" or \"recorder\"",
        )
        .add_setting(
            "serial_device",
            &format!("\"{DEFAULT_SERIAL_DEVICE}\""),
            "Link to the peer controller",
        )
        .add_setting(
            "baud_rate",
            &DEFAULT_BAUD_RATE.to_string(),
            "Serial line speed",
        )
        .add_setting(
            "recorder_command",
            &format!("\"{DEFAULT_RECORDER_COMMAND}\""),
            "Called with --command start|stop",
        )
        .build();

    let triggers = [
        ("first-call-morning", "at = \"07:55\"", ACTION_PRE_EVENT),
        ("colors", "at = \"08:00\"", ACTION_MORNING),
        ("first-call-sunset", "sunset_offset = -5", ACTION_PRE_EVENT),
        ("retreat", "sunset_offset = 0", ACTION_EVENT),
        ("taps", "at = \"22:00\"", ACTION_NIGHT),
    ]
    .iter()
    .map(|(id, when, action)| {
        format!("# [[trigger]]\n# id = \"{id}\"\n# {when}\n# action = \"{action}\"")
    })
    .collect::<Vec<_>>()
    .join("\n#\n");

    format!(
        "{settings}\n\n#[Triggers]\n\
         # Without [[trigger]] tables the programme below is used. Windows default\n\
         # to whole-minute matching for \"serial\" and 10s early / 60s for \"recorder\";\n\
         # set early_seconds and window_seconds per trigger to override.\n#\n{triggers}\n"
    )
}

struct ConfigBuilder {
    entries: Vec<ConfigEntry>,
}

enum ConfigEntry {
    Section(String),
    Setting { line: String, comment: String },
}

impl ConfigBuilder {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    fn add_section(mut self, title: &str) -> Self {
        self.entries.push(ConfigEntry::Section(format!("#[{title}]")));
        self
    }

    fn add_setting(mut self, key: &str, value: &str, comment: &str) -> Self {
        self.entries.push(ConfigEntry::Setting {
            line: format!("{key} = {value}"),
            comment: format!("# {comment}"),
        });
        self
    }

    fn build(self) -> String {
        // Align every comment one space past the longest setting line
        let max_width = self
            .entries
            .iter()
            .filter_map(|entry| match entry {
                ConfigEntry::Setting { line, .. } => Some(line.len()),
                ConfigEntry::Section(_) => None,
            })
            .max()
            .unwrap_or(0)
            + 1;

        let mut result = Vec::new();
        let mut first_section = true;

        for entry in self.entries {
            match entry {
                ConfigEntry::Section(title) => {
                    if !first_section {
                        result.push(String::new());
                    }
                    result.push(title);
                    first_section = false;
                }
                ConfigEntry::Setting { line, comment } => {
                    let padding = " ".repeat(max_width - line.len());
                    result.push(format!("{line}{padding}{comment}"));
                }
            }
        }

        result.join("\n")
    }
}
