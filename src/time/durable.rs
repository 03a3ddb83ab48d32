//! Battery-backed clock storage that survives restarts and power loss.
//!
//! The durable clock is only ever written after a successful network sync or
//! an explicit manual set, and only read when the network is unavailable.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::TimeError;

/// Persistent clock store.
pub trait DurableClock: Send {
    /// Read the stored instant.
    fn read(&self) -> Result<DateTime<Utc>, TimeError>;

    /// Overwrite the stored instant.
    fn write(&mut self, utc: DateTime<Utc>) -> Result<(), TimeError>;

    /// Human-readable identity used as the sync source label.
    fn name(&self) -> String;
}

/// `struct rtc_time` from `<linux/rtc.h>`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcTime {
    pub tm_sec: nix::libc::c_int,
    pub tm_min: nix::libc::c_int,
    pub tm_hour: nix::libc::c_int,
    pub tm_mday: nix::libc::c_int,
    pub tm_mon: nix::libc::c_int,
    pub tm_year: nix::libc::c_int,
    pub tm_wday: nix::libc::c_int,
    pub tm_yday: nix::libc::c_int,
    pub tm_isdst: nix::libc::c_int,
}

nix::ioctl_read!(rtc_rd_time, b'p', 0x09, RtcTime);
nix::ioctl_write_ptr!(rtc_set_time, b'p', 0x0a, RtcTime);

impl RtcTime {
    /// Convert kernel fields (years since 1900, zero-based month) to UTC.
    pub fn to_utc(self) -> Result<DateTime<Utc>, TimeError> {
        let invalid = || {
            TimeError::DurableClockInvalid(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                self.tm_year + 1900,
                self.tm_mon + 1,
                self.tm_mday,
                self.tm_hour,
                self.tm_min,
                self.tm_sec
            ))
        };

        let month = u32::try_from(self.tm_mon + 1).map_err(|_| invalid())?;
        let day = u32::try_from(self.tm_mday).map_err(|_| invalid())?;
        let hour = u32::try_from(self.tm_hour).map_err(|_| invalid())?;
        let minute = u32::try_from(self.tm_min).map_err(|_| invalid())?;
        let second = u32::try_from(self.tm_sec).map_err(|_| invalid())?;

        NaiveDate::from_ymd_opt(self.tm_year + 1900, month, day)
            .and_then(|date| date.and_hms_opt(hour, minute, second))
            .map(|naive| naive.and_utc())
            .ok_or_else(invalid)
    }

    pub fn from_utc(utc: DateTime<Utc>) -> Self {
        Self {
            tm_sec: utc.second() as nix::libc::c_int,
            tm_min: utc.minute() as nix::libc::c_int,
            tm_hour: utc.hour() as nix::libc::c_int,
            tm_mday: utc.day() as nix::libc::c_int,
            tm_mon: utc.month0() as nix::libc::c_int,
            tm_year: utc.year() - 1900,
            tm_wday: utc.weekday().num_days_from_sunday() as nix::libc::c_int,
            tm_yday: utc.ordinal0() as nix::libc::c_int,
            tm_isdst: 0,
        }
    }
}

/// Kernel RTC character device (`/dev/rtcN`), kept in UTC.
///
/// The device is opened per operation so a missing or busy clock only fails
/// that one read or write.
pub struct LinuxRtc {
    path: PathBuf,
}

impl LinuxRtc {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn unavailable(&self, e: impl std::fmt::Display) -> TimeError {
        TimeError::DurableClockUnavailable(format!("{}: {e}", self.path.display()))
    }
}

impl DurableClock for LinuxRtc {
    fn read(&self) -> Result<DateTime<Utc>, TimeError> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(e))?;

        let mut raw = RtcTime::default();
        // SAFETY: `raw` is a valid, properly aligned `struct rtc_time` and the
        // descriptor stays open for the duration of the call.
        unsafe { rtc_rd_time(file.as_raw_fd(), &mut raw) }.map_err(|e| self.unavailable(e))?;

        raw.to_utc()
    }

    fn write(&mut self, utc: DateTime<Utc>) -> Result<(), TimeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.unavailable(e))?;

        let raw = RtcTime::from_utc(utc);
        // SAFETY: `raw` outlives the call and matches the kernel layout.
        unsafe { rtc_set_time(file.as_raw_fd(), &raw) }.map_err(|e| self.unavailable(e))?;
        Ok(())
    }

    fn name(&self) -> String {
        format!("rtc:{}", self.path.display())
    }
}

/// In-memory durable clock.
///
/// Clones share the same storage, so a test can keep a handle and inspect or
/// corrupt what the controller wrote. The stored value does not tick.
#[derive(Clone, Default)]
pub struct MemoryRtc {
    stored: Arc<Mutex<Option<DateTime<Utc>>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryRtc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_time(utc: DateTime<Utc>) -> Self {
        let rtc = Self::default();
        rtc.preset(utc);
        rtc
    }

    /// Set the stored value directly, bypassing `write`.
    pub fn preset(&self, utc: DateTime<Utc>) {
        *self.stored.lock().unwrap_or_else(|e| e.into_inner()) = Some(utc);
    }

    pub fn stored(&self) -> Option<DateTime<Utc>> {
        *self.stored.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make subsequent writes fail, as a disconnected clock chip would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl DurableClock for MemoryRtc {
    fn read(&self) -> Result<DateTime<Utc>, TimeError> {
        self.stored()
            .ok_or_else(|| TimeError::DurableClockUnavailable("memory clock never set".into()))
    }

    fn write(&mut self, utc: DateTime<Utc>) -> Result<(), TimeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TimeError::DurableClockUnavailable(
                "memory clock rejected write".into(),
            ));
        }
        self.preset(utc);
        Ok(())
    }

    fn name(&self) -> String {
        "rtc:memory".to_string()
    }
}
