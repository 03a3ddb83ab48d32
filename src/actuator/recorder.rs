//! External recorder sink.
//!
//! Each action code maps to a recording length. Dispatch starts a background
//! thread that runs `<command> --command start`, waits out the length, then
//! runs `<command> --command stop`, so the loop never waits on the recorder.

use anyhow::Result;
use std::collections::BTreeMap;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::ActuatorSink;
use crate::scheduler::ActionCode;

pub struct RecorderSink {
    command: String,
    durations: BTreeMap<String, Duration>,
    active: Arc<AtomicUsize>,
    debug_enabled: bool,
}

impl RecorderSink {
    pub fn new(command: &str, durations: BTreeMap<String, Duration>, debug_enabled: bool) -> Self {
        Self {
            command: command.to_string(),
            durations,
            active: Arc::new(AtomicUsize::new(0)),
            debug_enabled,
        }
    }

    /// Recordings started and not yet stopped.
    pub fn active_recordings(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

fn run_recorder(command: &str, verb: &str) -> Result<(), String> {
    let status = Command::new(command)
        .args(["--command", verb])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|e| format!("failed to run {command}: {e}"))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("{command} --command {verb} exited with {status}"))
    }
}

impl ActuatorSink for RecorderSink {
    fn dispatch(&mut self, action: &ActionCode) -> Result<()> {
        let Some(duration) = self.durations.get(action.as_str()).copied() else {
            log_warning!("No recording length for action \"{action}\", ignoring");
            return Ok(());
        };

        let command = self.command.clone();
        let active = Arc::clone(&self.active);
        let debug_enabled = self.debug_enabled;
        active.fetch_add(1, Ordering::SeqCst);

        thread::Builder::new()
            .name("recorder".into())
            .spawn(move || {
                match run_recorder(&command, "start") {
                    Ok(()) => {
                        if debug_enabled {
                            log_debug!("Recording for {}s", duration.as_secs());
                        }
                        thread::sleep(duration);
                        if let Err(e) = run_recorder(&command, "stop") {
                            log_warning!("{e}");
                        }
                    }
                    Err(e) => log_warning!("{e}"),
                }
                active.fetch_sub(1, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.active.fetch_sub(1, Ordering::SeqCst);
                anyhow::anyhow!("Failed to start recorder thread: {e}")
            })?;

        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "recorder"
    }

    /// Stop a recording still in progress so the file is closed cleanly.
    fn cleanup(self: Box<Self>, debug_enabled: bool) {
        if self.active_recordings() > 0 {
            if debug_enabled {
                log_debug!("Stopping recording in progress");
            }
            if let Err(e) = run_recorder(&self.command, "stop") {
                log_warning!("{e}");
            }
        }
    }
}
