//! Application-wide constants: defaults, limits, and protocol values.

// # Process

pub const EXIT_FAILURE: i32 = 1;
pub const CONFIG_FILE_NAME: &str = "bugler.toml";
pub const CONFIG_DIR_NAME: &str = "bugler";
pub const LOCK_FILE_NAME: &str = "bugler.lock";

// # Clock

/// Default fixed offset from UTC, written `±HH:MM` (Pacific standard time).
pub const DEFAULT_UTC_OFFSET: &str = "-08:00";
pub const DEFAULT_ENABLE_DST: bool = true;
/// Hardware clock readings from before this year are treated as corrupt.
pub const DEFAULT_MIN_PLAUSIBLE_YEAR: i32 = 2025;
pub const DEFAULT_RTC_DEVICE: &str = "/dev/rtc0";
pub const MAXIMUM_UTC_OFFSET_SECONDS: i32 = 14 * 3600;
pub const DST_SHIFT_SECONDS: i64 = 3600;

// # Network time

pub const DEFAULT_NTP_HOSTS: &[&str] = &[
    "pool.ntp.org",
    "time.google.com",
    "time.cloudflare.com",
    "time.nist.gov",
];
pub const DEFAULT_NTP_RETRY_DELAY: u64 = 1; // seconds
pub const DEFAULT_NTP_TIMEOUT: u64 = 5; // seconds per host
pub const MINIMUM_NTP_TIMEOUT: u64 = 1;
pub const MAXIMUM_NTP_TIMEOUT: u64 = 30;
pub const MAXIMUM_NTP_RETRY_DELAY: u64 = 30;
pub const DEFAULT_RESYNC_INTERVAL: u64 = 3600; // seconds, while connected
pub const DEFAULT_RECONNECT_INTERVAL: u64 = 1800; // seconds, while disconnected
pub const MINIMUM_SYNC_INTERVAL: u64 = 60;
pub const DEFAULT_CONNECTIVITY_PROBE: &str = "pool.ntp.org:123";

pub const NTP_PORT: u16 = 123;
pub const NTP_PACKET_LEN: usize = 48;
/// LI = 0, VN = 3, Mode = 3 (client)
pub const NTP_CLIENT_REQUEST: u8 = 0x1B;
/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;
pub const NTP_MAX_STRATUM: u8 = 15;
pub const NTP_MAX_RTT_CORRECTION_MICROS: u64 = 1_000_000;

// # Sunset data

pub const DEFAULT_SUNSET_DATA: &str = "sunset_data.csv";
pub const DEFAULT_EPOCH_START: &str = "2025-01-01";
pub const MINUTES_PER_DAY: u32 = 1440;
pub const SECONDS_PER_DAY: u32 = 86_400;

// # Scheduler

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const MINIMUM_TICK_INTERVAL_MS: u64 = 100;
pub const MAXIMUM_TICK_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_IDLE_POLL_INTERVAL: u64 = 60; // seconds
pub const DEFAULT_LATE_NIGHT_CUTOFF: &str = "23:54:00";
pub const DEFAULT_SUNSET_TRIGGERS: bool = true;

/// Whole-minute matching used by the serial deployment.
pub const SERIAL_EARLY_SECONDS: u32 = 0;
pub const SERIAL_WINDOW_SECONDS: u32 = 60;
/// Ten seconds early, sixty second window, used by the recorder deployment.
pub const RECORDER_EARLY_SECONDS: u32 = 10;
pub const RECORDER_WINDOW_SECONDS: u32 = 60;
pub const MAXIMUM_EARLY_SECONDS: u32 = 3600;
pub const MAXIMUM_WINDOW_SECONDS: u32 = 3600;
pub const MAXIMUM_SUNSET_OFFSET_MINUTES: i32 = 720;

// # Actuator

pub const DEFAULT_SINK: &str = "serial";
pub const DEFAULT_SERIAL_DEVICE: &str = "/dev/ttyS1";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const SUPPORTED_BAUD_RATES: &[u32] = &[1200, 2400, 4800, 9600, 19200, 38400];
pub const DEFAULT_RECORDER_COMMAND: &str = "audio-recorder";
pub const DEFAULT_RECORDING_DURATION: u64 = 120; // seconds
pub const MAXIMUM_RECORDING_DURATION: u64 = 3600;

/// Peer messages understood on the serial link
pub const PEER_SUNSET_TOGGLE: &str = "Auto_Sunset_Toggle";
pub const PEER_SUNSET_ON: &str = "Auto_Sunset_ON";
pub const PEER_SUNSET_OFF: &str = "Auto_Sunset_OFF";
pub const PEER_ACK: &str = "ACK";
/// Longest unterminated inbound line kept while waiting for its newline
pub const PEER_LINE_LIMIT: usize = 256;

// # Action codes of the dual-controller deployment

pub const ACTION_MORNING: &str = "0";
pub const ACTION_NIGHT: &str = "1";
pub const ACTION_PRE_EVENT: &str = "2";
pub const ACTION_EVENT: &str = "3";

/// Default recording lengths for the recorder deployment, per action code.
pub const DEFAULT_RECORDING_DURATIONS: &[(&str, u64)] = &[
    (ACTION_MORNING, 180),
    (ACTION_NIGHT, 120),
    (ACTION_PRE_EVENT, 30),
    (ACTION_EVENT, 120),
];

#[cfg(any(test, feature = "testing-support"))]
pub mod test_constants {
    pub const TEST_UTC_OFFSET: &str = "-08:00";
    pub const TEST_EPOCH_START: &str = "2025-01-01";
    pub const TEST_SUNSET_MINUTES: u32 = 1080;
}
