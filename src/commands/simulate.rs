//! `bugler simulate`: run the controller over simulated time.
//!
//! Time only advances when the loop waits, so days pass in moments. The
//! hardware is replaced: the clock chip by an in-memory one preset to the start
//! time, the network by a permanently offline link, and the actuator by an
//! in-memory sink whose dispatches are listed at the end.

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use std::sync::Arc;

use crate::Bugler;
use crate::actuator::RecordingSink;
use crate::config::Config;
use crate::logger::Log;
use crate::time::{
    SimulatedTimeSource, WallClock, connectivity::Offline, durable::MemoryRtc,
    source::parse_datetime,
};

/// Convert a local wall time to UTC. A time that exists under DST is taken as
/// DST; the spring-forward gap resolves to standard time.
pub fn local_to_utc(local: NaiveDateTime, utc_offset_seconds: i32, enable_dst: bool) -> DateTime<Utc> {
    let standard = (local - chrono::Duration::seconds(utc_offset_seconds as i64)).and_utc();
    if enable_dst {
        let daylight = standard - chrono::Duration::hours(1);
        let wall = WallClock::from_utc(daylight, utc_offset_seconds, true);
        if wall.dst && wall.naive() == local {
            return daylight;
        }
    }
    standard
}

/// Run the simulation and return the action codes that were dispatched.
pub fn run_simulation(
    config: Config,
    start: DateTime<Utc>,
    days: u32,
    debug_enabled: bool,
) -> Result<Vec<String>> {
    let end = start + chrono::Duration::days(days as i64);
    let source = Arc::new(SimulatedTimeSource::new(start, Some(end)));
    let sink = RecordingSink::new();

    let result = Bugler::new(debug_enabled)
        .without_lock()
        .without_headers()
        .with_config(config)
        .with_time_source(source)
        .with_durable_clock(Box::new(MemoryRtc::with_time(start)))
        .with_connectivity(Box::new(Offline))
        .with_sink(Box::new(sink.clone()))
        .run();

    Log::set_simulated_time(None);
    result?;

    Ok(sink.codes())
}

pub fn handle_simulate_command(
    start_time: &str,
    days: u32,
    log_to_file: bool,
    debug_enabled: bool,
) -> Result<()> {
    let local = parse_datetime(start_time).map_err(|e| anyhow::anyhow!("Invalid start time: {e}"))?;
    let config = Config::load()?;
    let start = local_to_utc(local, config.utc_offset_seconds()?, config.enable_dst());

    let _guard = if log_to_file {
        let file_name = format!(
            "bugler-simulation-{}.log",
            Local::now().format("%Y%m%d-%H%M%S")
        );
        println!("Writing simulation log to {file_name}");
        Some(Log::start_file_logging(file_name)?)
    } else {
        None
    };

    log_version!();
    log_block_start!("Simulation Mode");
    log_decorated!(
        "Simulating {days} day{} from {} (local)",
        if days == 1 { "" } else { "s" },
        local.format("%Y-%m-%d %H:%M:%S")
    );
    log_indented!("Hardware clock, network and actuator are simulated");

    let codes = run_simulation(config, start, days, debug_enabled)?;

    log_block_start!("Simulation complete: {} dispatches", codes.len());
    if !codes.is_empty() {
        log_indented!("{}", codes.join(" "));
    }
    log_end!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_local_to_utc_across_dst() {
        let pst = -8 * 3600;

        // Winter: standard time
        assert_eq!(
            local_to_utc(local(2025, 1, 15, 12, 0), pst, true),
            Utc.with_ymd_and_hms(2025, 1, 15, 20, 0, 0).unwrap()
        );
        // Summer: daylight time
        assert_eq!(
            local_to_utc(local(2025, 7, 4, 12, 0), pst, true),
            Utc.with_ymd_and_hms(2025, 7, 4, 19, 0, 0).unwrap()
        );
        // DST disabled: always standard
        assert_eq!(
            local_to_utc(local(2025, 7, 4, 12, 0), pst, false),
            Utc.with_ymd_and_hms(2025, 7, 4, 20, 0, 0).unwrap()
        );
    }
}
