//! Configuration validation functionality.
//!
//! Rejects values the controller cannot run with and warns about settings that
//! work but risk missed triggers.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::time::Duration;

use super::{Config, parse_clock_time, parse_utc_offset};
use crate::common::constants::*;

pub fn validate_config(config: &Config) -> Result<()> {
    // Clock
    if let Some(offset) = &config.utc_offset {
        let seconds = parse_utc_offset(offset)?;
        if seconds.abs() > MAXIMUM_UTC_OFFSET_SECONDS {
            anyhow::bail!("utc_offset ({offset}) must be within ±14:00");
        }
    }

    if let Some(year) = config.min_plausible_year
        && !(2000..=9999).contains(&year)
    {
        anyhow::bail!("min_plausible_year ({year}) must be between 2000 and 9999");
    }

    if let Some(device) = &config.rtc_device
        && device.trim().is_empty()
    {
        anyhow::bail!("rtc_device must not be empty");
    }

    // Network time
    if let Some(hosts) = &config.ntp_hosts {
        if hosts.is_empty() {
            anyhow::bail!("ntp_hosts must list at least one time server");
        }
        if hosts.iter().any(|h| h.trim().is_empty()) {
            anyhow::bail!("ntp_hosts must not contain empty entries");
        }
    }

    if let Some(delay) = config.ntp_retry_delay
        && delay > MAXIMUM_NTP_RETRY_DELAY
    {
        anyhow::bail!(
            "ntp_retry_delay ({delay}s) must be at most {MAXIMUM_NTP_RETRY_DELAY} seconds"
        );
    }

    if let Some(timeout) = config.ntp_timeout
        && !(MINIMUM_NTP_TIMEOUT..=MAXIMUM_NTP_TIMEOUT).contains(&timeout)
    {
        anyhow::bail!(
            "ntp_timeout ({timeout}s) must be between {MINIMUM_NTP_TIMEOUT} and {MAXIMUM_NTP_TIMEOUT} seconds"
        );
    }

    for (name, value) in [
        ("resync_interval", config.resync_interval),
        ("reconnect_interval", config.reconnect_interval),
    ] {
        if let Some(seconds) = value
            && seconds < MINIMUM_SYNC_INTERVAL
        {
            anyhow::bail!(
                "{name} ({seconds}s) must be at least {MINIMUM_SYNC_INTERVAL} seconds"
            );
        }
    }

    // Sunset data
    config.epoch()?;

    // Scheduler
    if let Some(ms) = config.tick_interval_ms
        && !(MINIMUM_TICK_INTERVAL_MS..=MAXIMUM_TICK_INTERVAL_MS).contains(&ms)
    {
        anyhow::bail!(
            "tick_interval_ms ({ms}) must be between {MINIMUM_TICK_INTERVAL_MS} and {MAXIMUM_TICK_INTERVAL_MS}"
        );
    }

    if let Some(seconds) = config.idle_poll_interval
        && !(1..=3600).contains(&seconds)
    {
        anyhow::bail!("idle_poll_interval ({seconds}s) must be between 1 and 3600 seconds");
    }

    config.late_cutoff_seconds()?;

    // Actuator
    if let Some(baud) = config.baud_rate
        && !SUPPORTED_BAUD_RATES.contains(&baud)
    {
        anyhow::bail!(
            "baud_rate ({baud}) must be one of {}",
            SUPPORTED_BAUD_RATES
                .iter()
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    if let Some(durations) = &config.recorder_durations {
        for (code, seconds) in durations {
            if *seconds == 0 || *seconds > MAXIMUM_RECORDING_DURATION {
                anyhow::bail!(
                    "recorder_durations.\"{code}\" ({seconds}s) must be between 1 and {MAXIMUM_RECORDING_DURATION} seconds"
                );
            }
        }
    }

    validate_triggers(config)?;

    warn_on_sync_latency(config);

    Ok(())
}

fn validate_triggers(config: &Config) -> Result<()> {
    let Some(triggers) = &config.triggers else {
        return Ok(());
    };

    let mut seen = HashSet::new();
    for trigger in triggers {
        if trigger.id.trim().is_empty() {
            anyhow::bail!("Every [[trigger]] needs a non-empty id");
        }
        if !seen.insert(trigger.id.as_str()) {
            anyhow::bail!("Duplicate trigger id '{}'", trigger.id);
        }

        if trigger.action.is_empty() || trigger.action.chars().any(char::is_whitespace) {
            anyhow::bail!(
                "trigger '{}' action must be a single token without whitespace",
                trigger.id
            );
        }

        match (&trigger.at, trigger.sunset_offset) {
            (Some(at), None) => {
                parse_clock_time(at).with_context(|| format!("trigger '{}'", trigger.id))?;
            }
            (None, Some(offset)) => {
                if offset.abs() > MAXIMUM_SUNSET_OFFSET_MINUTES {
                    anyhow::bail!(
                        "trigger '{}' sunset_offset ({offset}) must be within ±{MAXIMUM_SUNSET_OFFSET_MINUTES} minutes",
                        trigger.id
                    );
                }
            }
            _ => anyhow::bail!(
                "trigger '{}' needs exactly one of 'at' or 'sunset_offset'",
                trigger.id
            ),
        }

        if let Some(early) = trigger.early_seconds
            && early > MAXIMUM_EARLY_SECONDS
        {
            anyhow::bail!(
                "trigger '{}' early_seconds ({early}) must be at most {MAXIMUM_EARLY_SECONDS}",
                trigger.id
            );
        }

        if let Some(window) = trigger.window_seconds
            && !(1..=MAXIMUM_WINDOW_SECONDS).contains(&window)
        {
            anyhow::bail!(
                "trigger '{}' window_seconds ({window}) must be between 1 and {MAXIMUM_WINDOW_SECONDS}",
                trigger.id
            );
        }
    }

    Ok(())
}

/// Worst-case time one sync attempt can hold up the loop: every host timing
/// out plus the delay between hosts.
pub(crate) fn sync_latency_bound(config: &Config) -> Duration {
    let hosts = config.ntp_hosts().len() + usize::from(config.ntp_custom_host.is_some());
    let hosts = hosts as u32;
    config.ntp_timeout() * hosts + config.ntp_retry_delay() * hosts.saturating_sub(1)
}

/// Narrowest activation window across all triggers, in seconds.
pub(crate) fn narrowest_window(config: &Config) -> Option<u32> {
    config
        .trigger_definitions()
        .ok()?
        .iter()
        .map(|t| t.early_offset_seconds + t.window_length_seconds)
        .min()
}

fn warn_on_sync_latency(config: &Config) {
    let Some(narrowest) = narrowest_window(config) else {
        return;
    };
    let bound = sync_latency_bound(config);
    if bound.as_secs() * 2 > narrowest as u64 {
        log_pipe!();
        log_warning!(
            "A failing time sync can block for up to {}s, more than half of the narrowest trigger window ({}s)",
            bound.as_secs(),
            narrowest
        );
        log_indented!("Lower ntp_timeout, shorten ntp_hosts, or widen window_seconds");
    }
}
