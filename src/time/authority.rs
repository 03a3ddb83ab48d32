//! The single owner of "what time is it".
//!
//! `TimeAuthority` holds the volatile clock, the durable clock and the network
//! time source. It decides which of them to believe and turns the result into
//! DST-adjusted local wall-clock fields.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::dst::is_dst;
use super::durable::DurableClock;
use super::ntp::NetworkTimeSource;
use super::source::TimeSource;
use super::volatile::VolatileClock;
use crate::common::constants::DST_SHIFT_SECONDS;
use crate::error::TimeError;

/// Where the current time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Unsynced,
    SyncedNetwork,
    SyncedDurable,
    SyncedManual,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Unsynced => write!(f, "time unsynchronized"),
            SyncStatus::SyncedNetwork => write!(f, "synchronized from network"),
            SyncStatus::SyncedDurable => write!(f, "recovered from hardware clock"),
            SyncStatus::SyncedManual => write!(f, "set manually"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub status: SyncStatus,
    /// UTC instant of the last successful sync
    pub last_sync: Option<DateTime<Utc>>,
    /// Host name or durable clock identity that provided it
    pub source: Option<String>,
}

impl SyncState {
    fn unsynced() -> Self {
        Self {
            status: SyncStatus::Unsynced,
            last_sync: None,
            source: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.status != SyncStatus::Unsynced
    }
}

/// Result of a successful network sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub host: String,
    pub utc: DateTime<Utc>,
    /// False when the durable mirror write failed
    pub mirrored: bool,
}

/// Local calendar time as seen by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub dst: bool,
}

impl WallClock {
    /// Derive local time from a UTC instant: fixed offset, then one hour more
    /// when DST is enabled and in effect at the standard-time local hour.
    pub fn from_utc(utc: DateTime<Utc>, utc_offset_seconds: i32, enable_dst: bool) -> Self {
        let standard = utc.naive_utc() + chrono::Duration::seconds(utc_offset_seconds as i64);
        let dst = enable_dst
            && is_dst(
                standard.year(),
                standard.month(),
                standard.day(),
                standard.hour(),
            );
        let local = if dst {
            standard + chrono::Duration::seconds(DST_SHIFT_SECONDS)
        } else {
            standard
        };

        Self {
            year: local.year(),
            month: local.month(),
            day: local.day(),
            hour: local.hour(),
            minute: local.minute(),
            second: local.second(),
            dst,
        }
    }

    pub fn seconds_past_midnight(&self) -> u32 {
        self.hour * 3600 + self.minute * 60 + self.second
    }

    pub fn minutes_past_midnight(&self) -> u32 {
        self.hour * 60 + self.minute
    }

    pub fn date(&self) -> NaiveDate {
        // Fields were produced by chrono so they always form a valid date
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).unwrap_or_default()
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.date()
            .and_hms_opt(self.hour, self.minute, self.second)
            .unwrap_or_default()
    }

    /// `HH:MM:SS`
    pub fn time_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    /// `MM/DD/YYYY`
    pub fn date_string(&self) -> String {
        format!("{:02}/{:02}/{:04}", self.month, self.day, self.year)
    }
}

/// Owns every clock and decides which one to believe.
pub struct TimeAuthority {
    clock: VolatileClock,
    durable: Box<dyn DurableClock>,
    network: Box<dyn NetworkTimeSource>,
    utc_offset_seconds: i32,
    min_plausible_year: i32,
    state: SyncState,
}

impl TimeAuthority {
    pub fn new(
        source: Arc<dyn TimeSource>,
        durable: Box<dyn DurableClock>,
        network: Box<dyn NetworkTimeSource>,
        utc_offset_seconds: i32,
        min_plausible_year: i32,
    ) -> Self {
        Self {
            clock: VolatileClock::from_system(source),
            durable,
            network,
            utc_offset_seconds,
            min_plausible_year,
            state: SyncState::unsynced(),
        }
    }

    /// Ordered host list for one sync attempt, with the per-connection custom
    /// host (if any) ahead of the defaults.
    pub fn host_list(custom: Option<&str>, defaults: &[String]) -> Vec<String> {
        let mut hosts = Vec::with_capacity(defaults.len() + 1);
        if let Some(custom) = custom.map(str::trim).filter(|h| !h.is_empty()) {
            hosts.push(custom.to_string());
        }
        hosts.extend(defaults.iter().cloned());
        hosts
    }

    /// Try each host in order until one answers.
    ///
    /// The retry delay is slept between hosts, not after the last one. On
    /// success the volatile clock is set and the result is mirrored to the
    /// durable clock; a failed mirror is logged but the sync still counts.
    pub fn sync_now(
        &mut self,
        hosts: &[String],
        retry_delay: Duration,
    ) -> Result<SyncReport, TimeError> {
        for (index, host) in hosts.iter().enumerate() {
            if index > 0 && !retry_delay.is_zero() {
                self.clock.time_source().sleep(retry_delay);
            }

            match self.network.query(host) {
                Ok(utc) => {
                    self.clock.set(utc);
                    self.state = SyncState {
                        status: SyncStatus::SyncedNetwork,
                        last_sync: Some(utc),
                        source: Some(host.clone()),
                    };

                    let mirrored = match self.durable.write(utc) {
                        Ok(()) => true,
                        Err(e) => {
                            log_warning!("Could not update {}: {e}", self.durable.name());
                            false
                        }
                    };

                    return Ok(SyncReport {
                        host: host.clone(),
                        utc,
                        mirrored,
                    });
                }
                Err(e) => {
                    log_indented!("{e}");
                }
            }
        }

        Err(TimeError::ExhaustedSyncFailure {
            attempted: hosts.len(),
        })
    }

    /// Fall back to the durable clock. Returns `false` and leaves the sync
    /// state untouched when it cannot be read or holds an implausible date.
    pub fn recover_from_durable(&mut self) -> bool {
        match self.try_recover_from_durable() {
            Ok(utc) => {
                log_decorated!(
                    "Recovered time from {}: {} UTC",
                    self.durable.name(),
                    utc.format("%Y-%m-%d %H:%M:%S")
                );
                true
            }
            Err(e) => {
                log_warning!("{e}");
                false
            }
        }
    }

    pub fn try_recover_from_durable(&mut self) -> Result<DateTime<Utc>, TimeError> {
        let utc = self.durable.read()?;
        if utc.year() < self.min_plausible_year {
            return Err(TimeError::DurableClockInvalid(format!(
                "{} is before {}",
                utc.format("%Y-%m-%d %H:%M:%S"),
                self.min_plausible_year
            )));
        }

        self.clock.set(utc);
        self.state = SyncState {
            status: SyncStatus::SyncedDurable,
            last_sync: Some(utc),
            source: Some(self.durable.name()),
        };
        Ok(utc)
    }

    /// Current local time. Pure with respect to the stores: nothing is read
    /// from hardware here.
    pub fn get_wall_clock(&self, enable_dst: bool) -> WallClock {
        WallClock::from_utc(self.clock.now(), self.utc_offset_seconds, enable_dst)
    }

    /// Explicitly set the time (UTC fields). The durable clock is written first;
    /// if that fails neither clock changes.
    pub fn set_manual(
        &mut self,
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Result<DateTime<Utc>, TimeError> {
        let utc = NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, second))
            .map(|naive| naive.and_utc())
            .ok_or_else(|| {
                TimeError::InvalidCalendar(format!(
                    "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                ))
            })?;

        self.durable.write(utc)?;
        self.clock.set(utc);
        self.state = SyncState {
            status: SyncStatus::SyncedManual,
            last_sync: Some(utc),
            source: Some("manual".to_string()),
        };
        Ok(utc)
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.state
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn durable_name(&self) -> String {
        self.durable.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::durable::MemoryRtc;
    use crate::time::ntp::MockNetworkTimeSource;
    use crate::time::source::SimulatedTimeSource;
    use chrono::TimeZone;
    use mockall::predicate::eq;

    fn hosts(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn authority(
        network: MockNetworkTimeSource,
        rtc: MemoryRtc,
    ) -> (TimeAuthority, Arc<SimulatedTimeSource>) {
        let start = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();
        let sim = Arc::new(SimulatedTimeSource::new(start, None));
        let authority = TimeAuthority::new(
            sim.clone(),
            Box::new(rtc),
            Box::new(network),
            -8 * 3600,
            2025,
        );
        (authority, sim)
    }

    #[test]
    fn test_fallback_attributes_success_to_third_host() {
        let served = Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap();
        let mut network = MockNetworkTimeSource::new();
        network
            .expect_query()
            .with(eq("a"))
            .times(1)
            .returning(|h| Err(TimeError::transient(h, "timeout")));
        network
            .expect_query()
            .with(eq("b"))
            .times(1)
            .returning(|h| Err(TimeError::transient(h, "timeout")));
        network
            .expect_query()
            .with(eq("c"))
            .times(1)
            .returning(move |_| Ok(served));

        let rtc = MemoryRtc::new();
        let (mut authority, sim) = authority(network, rtc.clone());

        let report = authority
            .sync_now(&hosts(&["a", "b", "c"]), Duration::from_secs(1))
            .unwrap();

        assert_eq!(report.host, "c");
        assert!(report.mirrored);
        assert_eq!(rtc.stored(), Some(served));
        assert_eq!(authority.sync_state().status, SyncStatus::SyncedNetwork);
        assert_eq!(authority.sync_state().source.as_deref(), Some("c"));
        // Two delays: before b and before c
        assert_eq!(sim.now(), Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 2).unwrap());
    }

    #[test]
    fn test_all_hosts_failing_is_exhausted_then_durable_used() {
        let mut network = MockNetworkTimeSource::new();
        network
            .expect_query()
            .times(3)
            .returning(|h| Err(TimeError::transient(h, "unreachable")));

        let stored = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let (mut authority, _sim) = authority(network, MemoryRtc::with_time(stored));

        let err = authority
            .sync_now(&hosts(&["a", "b", "c"]), Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, TimeError::ExhaustedSyncFailure { attempted: 3 }));
        assert_eq!(authority.sync_state().status, SyncStatus::Unsynced);

        assert!(authority.recover_from_durable());
        assert_eq!(authority.sync_state().status, SyncStatus::SyncedDurable);
        assert_eq!(authority.now_utc(), stored);
    }

    #[test]
    fn test_implausible_durable_year_is_rejected() {
        let network = MockNetworkTimeSource::new();
        let stale = Utc.with_ymd_and_hms(2024, 12, 31, 23, 0, 0).unwrap();
        let (mut authority, _sim) = authority(network, MemoryRtc::with_time(stale));

        assert!(matches!(
            authority.try_recover_from_durable(),
            Err(TimeError::DurableClockInvalid(_))
        ));
        assert!(!authority.recover_from_durable());
        assert_eq!(authority.sync_state().status, SyncStatus::Unsynced);
    }

    #[test]
    fn test_failed_mirror_still_counts_as_synced() {
        let served = Utc.with_ymd_and_hms(2025, 6, 1, 19, 0, 0).unwrap();
        let mut network = MockNetworkTimeSource::new();
        network.expect_query().returning(move |_| Ok(served));

        let rtc = MemoryRtc::new();
        rtc.set_fail_writes(true);
        let (mut authority, _sim) = authority(network, rtc.clone());

        let report = authority.sync_now(&hosts(&["a"]), Duration::ZERO).unwrap();
        assert!(!report.mirrored);
        assert_eq!(rtc.stored(), None);
        assert_eq!(authority.now_utc(), served);
    }

    #[test]
    fn test_set_manual_is_all_or_nothing() {
        let network = MockNetworkTimeSource::new();
        let rtc = MemoryRtc::new();
        let (mut authority, _sim) = authority(network, rtc.clone());
        let before = authority.now_utc();

        rtc.set_fail_writes(true);
        assert!(authority.set_manual(2025, 7, 4, 12, 0, 0).is_err());
        assert_eq!(authority.now_utc(), before);
        assert_eq!(authority.sync_state().status, SyncStatus::Unsynced);

        rtc.set_fail_writes(false);
        let set = authority.set_manual(2025, 7, 4, 12, 0, 0).unwrap();
        assert_eq!(rtc.stored(), Some(set));
        assert_eq!(authority.now_utc(), set);
        assert_eq!(authority.sync_state().status, SyncStatus::SyncedManual);

        assert!(matches!(
            authority.set_manual(2025, 2, 30, 0, 0, 0),
            Err(TimeError::InvalidCalendar(_))
        ));
    }

    #[test]
    fn test_wall_clock_applies_offset_and_dst() {
        // 2025-07-04 19:30 UTC is 11:30 PST, 12:30 PDT
        let utc = Utc.with_ymd_and_hms(2025, 7, 4, 19, 30, 0).unwrap();
        let summer = WallClock::from_utc(utc, -8 * 3600, true);
        assert_eq!((summer.hour, summer.minute), (12, 30));
        assert!(summer.dst);
        assert_eq!(summer.date_string(), "07/04/2025");

        let no_dst = WallClock::from_utc(utc, -8 * 3600, false);
        assert_eq!(no_dst.hour, 11);
        assert!(!no_dst.dst);

        // Offset crosses midnight backwards
        let utc = Utc.with_ymd_and_hms(2025, 1, 1, 3, 0, 5).unwrap();
        let winter = WallClock::from_utc(utc, -8 * 3600, true);
        assert_eq!(winter.date(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(winter.time_string(), "19:00:05");
        assert_eq!(winter.seconds_past_midnight(), 19 * 3600 + 5);
    }

    #[test]
    fn test_host_list_prepends_custom() {
        let defaults = hosts(&["pool.ntp.org", "time.google.com"]);
        assert_eq!(
            TimeAuthority::host_list(Some("ntp.local"), &defaults),
            hosts(&["ntp.local", "pool.ntp.org", "time.google.com"])
        );
        assert_eq!(TimeAuthority::host_list(None, &defaults), defaults);
        assert_eq!(TimeAuthority::host_list(Some("  "), &defaults), defaults);
    }
}
