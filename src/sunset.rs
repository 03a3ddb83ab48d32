//! Daily sunset lookup.
//!
//! The dataset is a two-column CSV with a header row: a day number counted
//! from the epoch date and the local sunset time in minutes past midnight.
//!
//! ```text
//! day,sunset_minutes
//! 0,1012
//! 1,1013
//! ```
//!
//! The table is loaded once and never changes. Bad rows are skipped one by
//! one so a partly damaged file still serves every day it can.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::Path;

use crate::common::constants::MINUTES_PER_DAY;
use crate::common::utils::private_path;
use crate::error::DatasetError;

/// Days elapsed from `epoch` to `date`. Zero on the epoch itself, negative
/// before it.
pub fn day_number(epoch: NaiveDate, date: NaiveDate) -> i64 {
    (date - epoch).num_days()
}

/// Outcome of parsing a dataset.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<DatasetError>,
}

#[derive(Debug, Clone)]
pub struct SunsetTable {
    epoch: NaiveDate,
    entries: BTreeMap<i64, u32>,
}

impl SunsetTable {
    pub fn empty(epoch: NaiveDate) -> Self {
        Self {
            epoch,
            entries: BTreeMap::new(),
        }
    }

    /// Parse dataset text. The first line is the header.
    pub fn parse(content: &str, epoch: NaiveDate) -> (Self, LoadReport) {
        let mut table = Self::empty(epoch);
        let mut report = LoadReport::default();

        for (index, line) in content.lines().enumerate().skip(1) {
            let line_number = index + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_row(line) {
                Ok((day, minutes)) => {
                    if table.entries.contains_key(&day) {
                        report.skipped.push(DatasetError::MalformedDatasetRow {
                            line: line_number,
                            reason: format!("duplicate day {day}"),
                        });
                    } else {
                        table.entries.insert(day, minutes);
                        report.loaded += 1;
                    }
                }
                Err(reason) => report.skipped.push(DatasetError::MalformedDatasetRow {
                    line: line_number,
                    reason,
                }),
            }
        }

        (table, report)
    }

    pub fn load(path: &Path, epoch: NaiveDate) -> Result<(Self, LoadReport)> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sunset data {}", private_path(path)))?;
        Ok(Self::parse(&content, epoch))
    }

    /// Load the dataset, logging what was skipped. An unreadable file yields an
    /// empty table: fixed-clock triggers keep working without it.
    pub fn load_or_empty(path: &Path, epoch: NaiveDate) -> Self {
        match Self::load(path, epoch) {
            Ok((table, report)) => {
                log_decorated!(
                    "Loaded {} sunset entries from {}",
                    report.loaded,
                    private_path(path)
                );
                if !report.skipped.is_empty() {
                    log_warning!("Skipped {} malformed sunset rows", report.skipped.len());
                    for error in report.skipped.iter().take(5) {
                        log_indented!("{error}");
                    }
                }
                table
            }
            Err(e) => {
                log_warning!("{e:#}");
                log_indented!("Sunset-relative triggers are disabled");
                Self::empty(epoch)
            }
        }
    }

    pub fn lookup(&self, day_number: i64) -> Option<u32> {
        self.entries.get(&day_number).copied()
    }

    pub fn day_number(&self, date: NaiveDate) -> i64 {
        day_number(self.epoch, date)
    }

    /// Sunset minutes for a local calendar date, if the table covers it.
    pub fn sunset_for(&self, date: NaiveDate) -> Option<u32> {
        self.lookup(self.day_number(date))
    }

    pub fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First and last day numbers covered.
    pub fn coverage(&self) -> Option<(i64, i64)> {
        let first = *self.entries.keys().next()?;
        let last = *self.entries.keys().next_back()?;
        Some((first, last))
    }
}

fn parse_row(line: &str) -> Result<(i64, u32), String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 2 {
        return Err(format!("expected 2 columns, found {}", fields.len()));
    }

    let day = fields[0]
        .parse::<i64>()
        .map_err(|_| format!("day number '{}' is not an integer", fields[0]))?;
    let minutes = fields[1]
        .parse::<u32>()
        .map_err(|_| format!("minutes '{}' is not a non-negative integer", fields[1]))?;
    if minutes >= MINUTES_PER_DAY {
        return Err(format!("minutes {minutes} outside 0-1439"));
    }

    Ok((day, minutes))
}
