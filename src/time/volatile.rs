//! Software clock anchored to monotonic time.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

use super::source::{TimeSource, chrono_duration};

/// A UTC clock that keeps running between synchronizations.
///
/// The clock stores an anchor (a UTC instant and the monotonic reading taken
/// when it was set) and reports `anchor_utc + (monotonic_now - anchor_mono)`.
/// Because the monotonic reading never decreases, neither does `now()` until
/// the next `set`.
pub struct VolatileClock {
    source: Arc<dyn TimeSource>,
    anchor_utc: DateTime<Utc>,
    anchor_mono: Duration,
}

impl VolatileClock {
    /// Create a clock seeded from the time source's own notion of UTC.
    pub fn from_system(source: Arc<dyn TimeSource>) -> Self {
        let anchor_utc = source.system_utc();
        let anchor_mono = source.monotonic();
        Self {
            source,
            anchor_utc,
            anchor_mono,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = self.source.monotonic().saturating_sub(self.anchor_mono);
        self.anchor_utc + chrono_duration(elapsed)
    }

    /// Re-anchor the clock to `utc` as of this moment.
    pub fn set(&mut self, utc: DateTime<Utc>) {
        self.anchor_utc = utc;
        self.anchor_mono = self.source.monotonic();
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.source
    }
}
