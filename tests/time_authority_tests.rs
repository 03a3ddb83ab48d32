use bugler::TimeError;
use bugler::commands::simulate::run_simulation;
use bugler::config::{Config, TriggerConfig};
use bugler::logger::Log;
use bugler::time::durable::MemoryRtc;
use bugler::time::ntp::NetworkTimeSource;
use bugler::time::{SimulatedTimeSource, SyncStatus, TimeAuthority, TimeSource};
use chrono::{DateTime, TimeZone, Utc};
use serial_test::serial;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers from a fixed table; unknown hosts time out. Every query is recorded.
#[derive(Clone, Default)]
struct ScriptedNetwork {
    answers: HashMap<String, DateTime<Utc>>,
    queried: Arc<Mutex<Vec<String>>>,
}

impl ScriptedNetwork {
    fn answering(host: &str, utc: DateTime<Utc>) -> Self {
        let mut network = Self::default();
        network.answers.insert(host.to_string(), utc);
        network
    }

    fn queried(&self) -> Vec<String> {
        self.queried.lock().unwrap().clone()
    }
}

impl NetworkTimeSource for ScriptedNetwork {
    fn query(&self, host: &str) -> Result<DateTime<Utc>, TimeError> {
        self.queried.lock().unwrap().push(host.to_string());
        self.answers
            .get(host)
            .copied()
            .ok_or_else(|| TimeError::TransientSyncFailure {
                host: host.to_string(),
                reason: "timed out".to_string(),
            })
    }
}

fn boot_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
}

fn hosts(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn authority(
    network: ScriptedNetwork,
    rtc: MemoryRtc,
) -> (TimeAuthority, Arc<SimulatedTimeSource>) {
    let source = Arc::new(SimulatedTimeSource::new(boot_time(), None));
    let source_dyn: Arc<dyn TimeSource> = source.clone();
    let authority = TimeAuthority::new(source_dyn, Box::new(rtc), Box::new(network), -8 * 3600, 2025);
    (authority, source)
}

#[test]
fn test_third_host_answers() {
    let network_time = Utc.with_ymd_and_hms(2025, 7, 4, 18, 0, 0).unwrap();
    let network = ScriptedNetwork::answering("c", network_time);
    let rtc = MemoryRtc::new();
    let (mut authority, source) = authority(network.clone(), rtc.clone());

    let report = authority
        .sync_now(&hosts(&["a", "b", "c"]), Duration::from_secs(1))
        .unwrap();

    assert_eq!(report.host, "c");
    assert!(report.mirrored);
    assert_eq!(network.queried(), vec!["a", "b", "c"]);
    assert_eq!(rtc.stored(), Some(network_time));
    assert_eq!(authority.sync_state().source.as_deref(), Some("c"));
    // One delay between each pair of hosts, none after the last
    assert_eq!(source.monotonic(), Duration::from_secs(2));
}

#[test]
fn test_exhausted_hosts_fall_back_to_durable() {
    let rtc_time = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
    let rtc = MemoryRtc::with_time(rtc_time);
    let (mut authority, _) = authority(ScriptedNetwork::default(), rtc.clone());

    let err = authority
        .sync_now(&hosts(&["a", "b", "c"]), Duration::ZERO)
        .unwrap_err();
    assert!(matches!(err, TimeError::ExhaustedSyncFailure { attempted: 3 }));
    assert_eq!(authority.sync_state().status, SyncStatus::Unsynced);

    assert!(authority.recover_from_durable());
    assert_eq!(authority.sync_state().status, SyncStatus::SyncedDurable);
    assert_eq!(authority.now_utc(), rtc_time);
    // The durable clock is only ever written after a network or manual set
    assert_eq!(rtc.stored(), Some(rtc_time));
}

#[test]
fn test_custom_host_goes_first() {
    let network_time = Utc.with_ymd_and_hms(2025, 7, 4, 18, 0, 0).unwrap();
    let network = ScriptedNetwork::answering("ntp.lan", network_time);
    let (mut authority, _) = authority(network.clone(), MemoryRtc::new());

    let list = TimeAuthority::host_list(Some("ntp.lan"), &hosts(&["a", "b"]));
    authority.sync_now(&list, Duration::ZERO).unwrap();

    assert_eq!(network.queried(), vec!["ntp.lan"]);
}

#[test]
fn test_wall_clock_advances_between_syncs() {
    let network_time = Utc.with_ymd_and_hms(2025, 7, 4, 18, 0, 0).unwrap();
    let (mut authority, source) =
        authority(ScriptedNetwork::answering("a", network_time), MemoryRtc::new());
    authority.sync_now(&hosts(&["a"]), Duration::ZERO).unwrap();

    let before = authority.get_wall_clock(true);
    source.advance(Duration::from_secs(90));
    let after = authority.get_wall_clock(true);

    // 18:00 UTC is 11:00 PDT
    assert_eq!(before.time_string(), "11:00:00");
    assert_eq!(after.time_string(), "11:01:30");
    assert!(after.naive() > before.naive());
}

fn sunset_file(rows: &[(i64, u32)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "day_number,sunset_minutes").unwrap();
    for (day, minutes) in rows {
        writeln!(file, "{day},{minutes}").unwrap();
    }
    file
}

fn simulation_config(sunset_data: &std::path::Path) -> Config {
    Config {
        utc_offset: Some("+00:00".to_string()),
        enable_dst: Some(false),
        sunset_data: Some(sunset_data.display().to_string()),
        epoch_start: Some("2025-01-01".to_string()),
        ..Config::default()
    }
}

#[test]
#[serial]
fn test_simulated_days_fire_each_trigger_once_per_day() {
    Log::set_enabled(false);
    // Days 59 and 60 are 2025-03-01 and 2025-03-02
    let data = sunset_file(&[(59, 1080), (60, 1082)]);
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

    let codes = run_simulation(simulation_config(data.path()), start, 2, false).unwrap();
    Log::set_enabled(true);

    let day = ["2", "0", "2", "3", "1"];
    let expected: Vec<&str> = day.iter().chain(day.iter()).copied().collect();
    assert_eq!(codes, expected);
}

#[test]
#[serial]
fn test_missing_sunset_day_keeps_fixed_triggers() {
    Log::set_enabled(false);
    let data = sunset_file(&[(59, 1080)]);
    // Starts on day 60, which has no row
    let start = Utc.with_ymd_and_hms(2025, 3, 2, 0, 0, 0).unwrap();

    let codes = run_simulation(simulation_config(data.path()), start, 1, false).unwrap();
    Log::set_enabled(true);

    assert_eq!(codes, vec!["2", "0", "1"]);
}

#[test]
#[serial]
fn test_simulation_starting_after_windows_skips_them() {
    Log::set_enabled(false);
    let data = sunset_file(&[(59, 1080)]);
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    let codes = run_simulation(simulation_config(data.path()), start, 1, false).unwrap();
    Log::set_enabled(true);

    // Morning windows were already over; the next day's morning calls run
    // until 12:00 on 2025-03-02
    assert_eq!(codes, vec!["2", "3", "1", "2", "0"]);
}

fn fixed_trigger(id: &str, at: &str, window_seconds: Option<u32>) -> TriggerConfig {
    TriggerConfig {
        id: id.to_string(),
        at: Some(at.to_string()),
        sunset_offset: None,
        action: id.to_string(),
        early_seconds: None,
        window_seconds,
    }
}

#[test]
#[serial]
fn test_long_idle_poll_still_wakes_after_midnight() {
    Log::set_enabled(false);
    let data = sunset_file(&[]);
    let config = Config {
        idle_poll_interval: Some(700),
        triggers: Some(vec![
            fixed_trigger("A", "00:03", None),
            fixed_trigger("B", "22:00", None),
        ]),
        ..simulation_config(data.path())
    };
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();

    let codes = run_simulation(config, start, 2, false).unwrap();
    Log::set_enabled(true);

    assert_eq!(codes, vec!["A", "B", "A", "B"]);
}

#[test]
#[serial]
fn test_trigger_after_late_cutoff_still_fires() {
    Log::set_enabled(false);
    let data = sunset_file(&[]);
    let config = Config {
        triggers: Some(vec![fixed_trigger("L", "23:58", Some(30))]),
        ..simulation_config(data.path())
    };
    // Already past the 23:54 cutoff, so the loop starts out idle
    let start = Utc.with_ymd_and_hms(2025, 3, 1, 23, 54, 30).unwrap();

    let codes = run_simulation(config, start, 1, false).unwrap();
    Log::set_enabled(true);

    assert_eq!(codes, vec!["L"]);
}
