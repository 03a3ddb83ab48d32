//! Time source abstraction for supporting both real and simulated time.
//!
//! Everything that needs to know "how much time has passed" or needs to wait
//! goes through a [`TimeSource`] handed in at construction. The volatile clock
//! anchors to its monotonic reading, the sync code sleeps through it between
//! hosts, and the control loop paces itself with it. The simulated source makes
//! whole days run in milliseconds for tests and the `simulate` command.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Trait for abstracting time operations
pub trait TimeSource: Send + Sync {
    /// Monotonic time elapsed since the source was created. Never decreases.
    fn monotonic(&self) -> Duration;

    /// The host's own notion of UTC, used only to seed the volatile clock.
    fn system_utc(&self) -> DateTime<Utc>;

    /// Sleep for the specified duration (or simulate it)
    fn sleep(&self, duration: Duration);

    /// Check if this is a simulated time source
    fn is_simulated(&self) -> bool;

    /// Check if simulation has ended (always false for real time)
    fn is_ended(&self) -> bool {
        false
    }
}

/// Real-time implementation backed by `Instant` and the system clock
pub struct RealTimeSource {
    started: Instant,
}

impl RealTimeSource {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for RealTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for RealTimeSource {
    fn monotonic(&self) -> Duration {
        self.started.elapsed()
    }

    fn system_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn is_simulated(&self) -> bool {
        false
    }
}

/// Fast-forward simulated time source.
///
/// Time only moves when someone sleeps: `sleep(d)` returns immediately after
/// advancing the simulated clock by exactly `d`, capped at the end time.
pub struct SimulatedTimeSource {
    /// UTC instant the simulation starts at
    start: DateTime<Utc>,
    /// Optional UTC instant after which the simulation is over
    end: Option<DateTime<Utc>>,
    /// Simulated time elapsed since `start`
    elapsed: Mutex<Duration>,
}

impl SimulatedTimeSource {
    pub fn new(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            start,
            end,
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Move simulated time forward without going through `sleep`.
    pub fn advance(&self, duration: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|e| e.into_inner());
        let next = *elapsed + duration;
        *elapsed = match self.end {
            Some(end) => {
                let limit = (end - self.start).to_std().unwrap_or(Duration::ZERO);
                next.min(limit)
            }
            None => next,
        };
    }

    /// Current simulated UTC instant
    pub fn now(&self) -> DateTime<Utc> {
        self.start + chrono_duration(self.monotonic())
    }
}

impl TimeSource for SimulatedTimeSource {
    fn monotonic(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn system_utc(&self) -> DateTime<Utc> {
        self.now()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }

    fn is_simulated(&self) -> bool {
        true
    }

    fn is_ended(&self) -> bool {
        match self.end {
            Some(end) => self.now() >= end,
            None => false,
        }
    }
}

/// Convert a std duration into a chrono duration, saturating on overflow.
pub fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Parse a datetime string in the format "YYYY-MM-DD HH:MM:SS"
pub fn parse_datetime(s: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("Invalid datetime format: {e}. Use YYYY-MM-DD HH:MM:SS"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_simulated_sleep_advances_exactly() {
        let start = Utc.with_ymd_and_hms(2025, 3, 9, 9, 0, 0).unwrap();
        let source = SimulatedTimeSource::new(start, None);

        source.sleep(Duration::from_secs(90));
        assert_eq!(source.monotonic(), Duration::from_secs(90));
        assert_eq!(source.now(), start + chrono::Duration::seconds(90));
        assert!(!source.is_ended());
    }

    #[test]
    fn test_simulated_source_caps_at_end() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = start + chrono::Duration::hours(1);
        let source = SimulatedTimeSource::new(start, Some(end));

        source.sleep(Duration::from_secs(7200));
        assert_eq!(source.now(), end);
        assert!(source.is_ended());
    }

    #[test]
    fn test_real_source_is_monotonic() {
        let source = RealTimeSource::new();
        let a = source.monotonic();
        let b = source.monotonic();
        assert!(b >= a);
        assert!(!source.is_simulated());
    }

    #[test]
    fn test_parse_datetime() {
        let parsed = parse_datetime("2025-11-02 08:59:55").unwrap();
        assert_eq!(parsed.to_string(), "2025-11-02 08:59:55");
        assert!(parse_datetime("2025-11-02T08:59:55").is_err());
        assert!(parse_datetime("2025-02-30 00:00:00").is_err());
    }
}
