//! `bugler set-time`: write an explicit UTC time to the hardware clock.
//!
//! The running controller (if any) keeps its own volatile clock, so after the
//! write it is sent SIGUSR1 and re-reads the hardware clock.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::io::lock;
use crate::time::{
    RealTimeSource, TimeAuthority, TimeSource, durable::LinuxRtc, ntp::SntpClient,
    source::parse_datetime,
};

/// Parse `YYYY-MM-DD HH:MM:SS` (UTC) and apply it through the authority.
pub fn apply_manual_time(authority: &mut TimeAuthority, datetime: &str) -> Result<DateTime<Utc>> {
    let naive = parse_datetime(datetime).map_err(|e| anyhow::anyhow!("Invalid time: {e}"))?;

    let utc = authority
        .set_manual(
            naive.year(),
            naive.month(),
            naive.day(),
            naive.hour(),
            naive.minute(),
            naive.second(),
        )
        .with_context(|| format!("Failed to write {}", authority.durable_name()))?;
    Ok(utc)
}

pub fn handle_set_time_command(datetime: &str) -> Result<()> {
    log_version!();

    let config = Config::load()?;
    let source: Arc<dyn TimeSource> = Arc::new(RealTimeSource::new());
    let mut authority = TimeAuthority::new(
        source,
        Box::new(LinuxRtc::new(config.rtc_device())),
        Box::new(SntpClient::new(config.ntp_timeout())),
        config.utc_offset_seconds()?,
        config.min_plausible_year(),
    );

    let utc = apply_manual_time(&mut authority, datetime)?;
    let wall = authority.get_wall_clock(config.enable_dst());

    log_block_start!(
        "Set {} to {} UTC",
        authority.durable_name(),
        utc.format("%Y-%m-%d %H:%M:%S")
    );
    log_indented!(
        "Local time: {} {}{}",
        wall.date_string(),
        wall.time_string(),
        if wall.dst { " (DST)" } else { "" }
    );

    match lock::get_running_instance()? {
        Some(info) => {
            lock::send_time_change_signal(info.pid)?;
            log_decorated!("Notified running instance (PID {})", info.pid);
        }
        None => log_decorated!("No running instance to notify"),
    }

    log_end!();
    Ok(())
}
