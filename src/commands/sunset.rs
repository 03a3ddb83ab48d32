//! `bugler sunset`: show what the controller would use for a date.

use anyhow::Result;
use chrono::{Datelike, NaiveDate, Utc};

use crate::common::utils::format_minutes;
use crate::config::{self, Config};
use crate::sunset::SunsetTable;
use crate::time::{WallClock, dst};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SunsetReport {
    pub date: NaiveDate,
    pub day_number: i64,
    pub sunset_minutes: Option<u32>,
    /// DST in effect at local noon
    pub dst: bool,
}

impl SunsetReport {
    pub fn for_date(table: &SunsetTable, date: NaiveDate, enable_dst: bool) -> Self {
        Self {
            date,
            day_number: table.day_number(date),
            sunset_minutes: table.sunset_for(date),
            dst: enable_dst && dst::is_dst(date.year(), date.month(), date.day(), 12),
        }
    }
}

pub fn handle_sunset_command(date: Option<&str>) -> Result<()> {
    log_version!();

    let config = Config::load()?;
    let utc_offset = config.utc_offset_seconds()?;

    let date = match date {
        Some(value) => NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("Invalid date '{value}': {e}. Use YYYY-MM-DD"))?,
        None => WallClock::from_utc(Utc::now(), utc_offset, config.enable_dst()).date(),
    };

    let config_dir = config::loading::get_config_base_dir()?;
    let table = SunsetTable::load_or_empty(&config.sunset_data_path(&config_dir), config.epoch()?);
    let report = SunsetReport::for_date(&table, date, config.enable_dst());

    log_block_start!("{} (day {})", report.date.format("%m/%d/%Y"), report.day_number);
    match report.sunset_minutes {
        Some(minutes) => log_indented!("Sunset: {}", format_minutes(minutes)),
        None => match table.coverage() {
            Some((first, last)) => {
                log_indented!("Sunset: no entry (data covers days {first} to {last})")
            }
            None => log_indented!("Sunset: no data loaded"),
        },
    }
    log_indented!("Daylight saving time: {}", if report.dst { "yes" } else { "no" });
    log_end!();

    Ok(())
}
