//! When to talk to the network.
//!
//! The policy is pure bookkeeping over monotonic timestamps: the loop asks
//! what to do, does it, and records that it tried. A failed attempt is still
//! recorded, so a dead server is retried on the next interval rather than on
//! every tick.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Nothing due
    Idle,
    /// Connected and the resync interval has passed
    Resync,
    /// Disconnected and the reconnect interval has passed
    Reconnect,
}

#[derive(Debug, Clone)]
pub struct SyncPolicy {
    resync_interval: Duration,
    reconnect_interval: Duration,
    last_sync_attempt: Option<Duration>,
    last_reconnect_attempt: Option<Duration>,
}

impl SyncPolicy {
    pub fn new(resync_interval: Duration, reconnect_interval: Duration) -> Self {
        Self {
            resync_interval,
            reconnect_interval,
            last_sync_attempt: None,
            last_reconnect_attempt: None,
        }
    }

    pub fn decide(&self, now: Duration, connected: bool) -> SyncDecision {
        let due = |last: Option<Duration>, interval: Duration| match last {
            Some(last) => now.saturating_sub(last) > interval,
            None => true,
        };

        if connected {
            if due(self.last_sync_attempt, self.resync_interval) {
                SyncDecision::Resync
            } else {
                SyncDecision::Idle
            }
        } else if due(self.last_reconnect_attempt, self.reconnect_interval) {
            SyncDecision::Reconnect
        } else {
            SyncDecision::Idle
        }
    }

    /// Record a sync attempt, successful or not.
    pub fn record_sync_attempt(&mut self, now: Duration) {
        self.last_sync_attempt = Some(now);
    }

    pub fn record_reconnect_attempt(&mut self, now: Duration) {
        self.last_reconnect_attempt = Some(now);
    }

    pub fn last_sync_attempt(&self) -> Option<Duration> {
        self.last_sync_attempt
    }
}
