//! Structured logging with visual formatting.
//!
//! Every line the controller prints hangs off a vertical pipe, so a day of
//! activity reads as one continuous trace:
//!
//! ```text
//! ┏ bugler v0.3.0 ━━╸
//! ┃
//! ┣ New day 06/01/2025 (day 151)
//! ┃   Sunset at 20:31
//! ┃
//! ┣ 07:55:00 first-call-morning: sending "2"
//! ┃
//! ┣[WARNING] Time unsynchronized
//! ╹
//! ```
//!
//! ## Conventions
//!
//! - **`log_block_start!`**: starts a new block (sync attempt, new day,
//!   dispatch). Prints an empty `┃` for spacing, then `┣ message`.
//! - **`log_decorated!`**: a line inside the current block, `┣ message`.
//! - **`log_indented!`**: detail under the previous line, `┃   message`.
//! - **`log_pipe!`**: a single empty `┃`, used before a standalone level line.
//! - **`log_info!`, `log_debug!`, `log_warning!`, `log_error!`**: `┣[LEVEL] message`.
//! - **`log_error_exit!`**: `┗[ERROR] message`, closing the trace on a fatal error.
//! - **`log_version!`** / **`log_end!`**: header and final marker.
//!
//! Output can be switched off (tests), routed to a file through a writer
//! thread (`simulate --log`), and prefixed with the simulated local time.

use chrono::NaiveDateTime;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Mutex, OnceLock};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

// Local wall-clock time of the simulation
static SIMULATED_NOW: Mutex<Option<NaiveDateTime>> = Mutex::new(None);

// Set once when file logging starts
static LOG_CHANNEL: OnceLock<Sender<LogMessage>> = OnceLock::new();

enum LogMessage {
    Line(String),
    Shutdown,
}

/// Shape of one log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    Block,
    Decorated,
    Indented,
    Pipe,
    Version,
    End,
    Info,
    Debug,
    Warning,
    Error,
    ErrorExit,
}

impl Entry {
    /// `(label, ANSI color)` for level lines.
    fn level(self) -> Option<(&'static str, u8)> {
        match self {
            Entry::Info => Some(("INFO", 32)),
            Entry::Debug => Some(("DEBUG", 32)),
            Entry::Warning => Some(("WARNING", 33)),
            Entry::Error | Entry::ErrorExit => Some(("ERROR", 31)),
            _ => None,
        }
    }

    /// Render the line, including the trailing newline. Colors are only used
    /// on the terminal.
    fn render(self, prefix: &str, message: &str, color: bool) -> String {
        let tag = match self.level() {
            Some((label, code)) if color => format!("[\x1b[{code}m{label}\x1b[0m]"),
            Some((label, _)) => format!("[{label}]"),
            None => String::new(),
        };

        match self {
            Entry::Block => format!("{prefix}┃\n{prefix}┣ {message}\n"),
            Entry::Decorated => format!("{prefix}┣ {message}\n"),
            Entry::Indented => format!("{prefix}┃   {message}\n"),
            Entry::Pipe => format!("{prefix}┃\n"),
            Entry::Version => format!("┏ bugler v{} ━━╸\n", env!("CARGO_PKG_VERSION")),
            Entry::End => format!("{prefix}╹\n"),
            Entry::ErrorExit => format!("{prefix}┃\n{prefix}┗{tag} {message}\n"),
            Entry::Info | Entry::Debug | Entry::Warning | Entry::Error => {
                format!("{prefix}┣{tag} {message}\n")
            }
        }
    }
}

/// Global logging switches.
pub struct Log;

impl Log {
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Record the current simulated local time so log lines carry it.
    /// Pass `None` to drop the prefix again.
    pub fn set_simulated_time(now: Option<NaiveDateTime>) {
        if let Ok(mut guard) = SIMULATED_NOW.lock() {
            *guard = now;
        }
    }

    /// Send all further output to `file_path` instead of stdout. Anything
    /// logged after the guard is dropped is discarded, so keep it for the run.
    pub fn start_file_logging(file_path: String) -> anyhow::Result<LoggerGuard> {
        let (tx, rx) = channel();

        LOG_CHANNEL
            .set(tx.clone())
            .map_err(|_| anyhow::anyhow!("File logging already started"))?;

        let handle = std::thread::spawn(move || {
            let mut file = std::fs::File::create(&file_path)?;
            while let Ok(LogMessage::Line(text)) = rx.recv() {
                file.write_all(text.as_bytes())?;
            }
            file.flush()?;
            Ok::<(), anyhow::Error>(())
        });

        Ok(LoggerGuard {
            tx,
            handle: Some(handle),
        })
    }

    /// `[YYYY-MM-DD HH:MM:SS] ` on simulated time, empty otherwise.
    fn timestamp_prefix() -> String {
        match SIMULATED_NOW.lock().ok().and_then(|guard| *guard) {
            Some(now) => format!("[{}] ", now.format("%Y-%m-%d %H:%M:%S")),
            None => String::new(),
        }
    }
}

/// Keeps the file writer running; flushes and joins it on drop.
pub struct LoggerGuard {
    tx: Sender<LogMessage>,
    handle: Option<std::thread::JoinHandle<anyhow::Result<()>>>,
}

impl Drop for LoggerGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(LogMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Format and write one entry. Called by the macros.
pub fn emit(entry: Entry, args: fmt::Arguments<'_>) {
    if !Log::is_enabled() {
        return;
    }

    let prefix = Log::timestamp_prefix();
    let message = args.to_string();

    match LOG_CHANNEL.get() {
        Some(tx) => {
            let _ = tx.send(LogMessage::Line(entry.render(&prefix, &message, false)));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            let _ = stdout.write_all(entry.render(&prefix, &message, true).as_bytes());
            let _ = stdout.flush();
        }
    }
}

// # Logging Macros

/// Start a new block of output.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Block, format_args!($($arg)+))
    };
}

/// A line inside the current block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Decorated, format_args!($($arg)+))
    };
}

/// Detail under the previous line.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Indented, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_pipe {
    () => {
        $crate::logger::emit($crate::logger::Entry::Pipe, format_args!(""))
    };
}

#[macro_export]
macro_rules! log_version {
    () => {
        $crate::logger::emit($crate::logger::Entry::Version, format_args!(""))
    };
}

#[macro_export]
macro_rules! log_end {
    () => {
        $crate::logger::emit($crate::logger::Entry::End, format_args!(""))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Info, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Debug, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Warning, format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::Error, format_args!($($arg)+))
    };
}

/// Close the trace with a fatal error.
#[macro_export]
macro_rules! log_error_exit {
    ($($arg:tt)+) => {
        $crate::logger::emit($crate::logger::Entry::ErrorExit, format_args!($($arg)+))
    };
}
