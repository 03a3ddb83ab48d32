//! Everything about establishing and reading the time.
//!
//! - `source`: real or simulated monotonic time and sleeping
//! - `volatile`: the running software clock
//! - `durable`: the battery-backed hardware clock
//! - `ntp`: network time queries
//! - `dst`: US daylight saving rules
//! - `authority`: decides which clock to believe and produces local time
//! - `policy`: when to resync or reconnect
//! - `connectivity`: whether the network is usable

pub mod authority;
pub mod connectivity;
pub mod dst;
pub mod durable;
pub mod ntp;
pub mod policy;
pub mod source;
pub mod volatile;

pub use authority::{SyncReport, SyncState, SyncStatus, TimeAuthority, WallClock};
pub use source::{RealTimeSource, SimulatedTimeSource, TimeSource};
