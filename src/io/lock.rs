//! Lock file management for single-instance enforcement.
//!
//! The controller owns hardware (the serial line, the RTC) that must have a
//! single owner, so only one instance may run. The lock file also tells the
//! `set-time` command which process to notify.
//!
//! Lock file format:
//! - Line 1: PID
//! - Line 2: config directory (empty when the default is used)

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::constants::LOCK_FILE_NAME;
use crate::config;

/// Information about a running bugler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub pid: u32,
    pub config_dir: Option<PathBuf>,
}

impl InstanceInfo {
    pub fn from_lock_contents(contents: &str) -> Result<Self> {
        let mut lines = contents.lines();
        let pid = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .context("Lock file is empty")?
            .parse::<u32>()
            .context("Invalid PID format in lock file")?;
        let config_dir = lines
            .next()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from);
        Ok(Self { pid, config_dir })
    }

    pub fn to_lock_contents(&self) -> String {
        match &self.config_dir {
            Some(dir) => format!("{}\n{}\n", self.pid, dir.display()),
            None => format!("{}\n\n", self.pid),
        }
    }
}

/// Held for the lifetime of the controller. The lock is released when the
/// file is closed, so a crashed instance never leaves a stale lock.
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn get_main_lock_path() -> PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(runtime_dir).join(LOCK_FILE_NAME)
}

/// Acquire the lock at the default path.
pub fn acquire_lock() -> Result<Option<InstanceLock>> {
    acquire_lock_at(&get_main_lock_path(), config::get_custom_config_dir())
}

/// Try to take the lock. Returns `Ok(None)` when another instance holds it.
pub fn acquire_lock_at(path: &Path, config_dir: Option<PathBuf>) -> Result<Option<InstanceLock>> {
    // Open without truncating so a running instance's PID is not wiped
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    let info = InstanceInfo {
        pid: std::process::id(),
        config_dir,
    };
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(info.to_lock_contents().as_bytes())?;
    file.flush()?;

    Ok(Some(InstanceLock {
        _file: file,
        path: path.to_path_buf(),
    }))
}

/// The running instance, if the lock file names a live process.
pub fn get_running_instance() -> Result<Option<InstanceInfo>> {
    read_instance_at(&get_main_lock_path())
}

pub fn read_instance_at(path: &Path) -> Result<Option<InstanceInfo>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return Ok(None),
    };
    let info = InstanceInfo::from_lock_contents(&contents)?;
    if is_instance_running(info.pid) {
        Ok(Some(info))
    } else {
        Ok(None)
    }
}

pub fn is_instance_running(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

/// Tell a running instance the durable clock changed (SIGUSR1).
pub fn send_time_change_signal(pid: u32) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGUSR1)
        .map_err(|e| anyhow::anyhow!("Failed to signal process {pid}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_info_contents() {
        let info = InstanceInfo::from_lock_contents("4242\n/etc/bugler\n").unwrap();
        assert_eq!(info.pid, 4242);
        assert_eq!(info.config_dir, Some(PathBuf::from("/etc/bugler")));
        assert_eq!(info.to_lock_contents(), "4242\n/etc/bugler\n");

        let info = InstanceInfo::from_lock_contents("17\n\n").unwrap();
        assert_eq!(info.config_dir, None);

        assert!(InstanceInfo::from_lock_contents("").is_err());
        assert!(InstanceInfo::from_lock_contents("not-a-pid\n").is_err());
    }

    #[test]
    fn test_second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);

        let lock = acquire_lock_at(&path, None).unwrap().unwrap();
        assert!(acquire_lock_at(&path, None).unwrap().is_none());

        let running = read_instance_at(&path).unwrap().unwrap();
        assert_eq!(running.pid, std::process::id());

        drop(lock);
        assert!(!path.exists());
        assert!(acquire_lock_at(&path, None).unwrap().is_some());
    }

    #[test]
    fn test_dead_pid_is_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LOCK_FILE_NAME);
        // PIDs are bounded well below this on Linux
        std::fs::write(&path, "4194305\n\n").unwrap();
        assert!(read_instance_at(&path).unwrap().is_none());
    }
}
