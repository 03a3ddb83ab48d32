//! Domain error taxonomy.
//!
//! These errors are local and non-fatal: the controller loop logs them, reports
//! a degraded status, and keeps ticking. Plumbing code elsewhere uses
//! `anyhow::Result` and only matches on these where the kind matters.

use thiserror::Error;

/// Errors raised while establishing or reading time.
#[derive(Debug, Error)]
pub enum TimeError {
    /// One time server failed; the next host in the list is tried.
    #[error("time server {host} failed: {reason}")]
    TransientSyncFailure { host: String, reason: String },

    /// Every host in the list failed.
    #[error("all {attempted} time servers failed")]
    ExhaustedSyncFailure { attempted: usize },

    /// The hardware clock returned a date that cannot be trusted.
    #[error("hardware clock reports implausible time: {0}")]
    DurableClockInvalid(String),

    /// The hardware clock could not be opened, read, or written.
    #[error("hardware clock unavailable: {0}")]
    DurableClockUnavailable(String),

    /// Calendar fields do not form a real date and time.
    #[error("invalid calendar time: {0}")]
    InvalidCalendar(String),
}

impl TimeError {
    pub(crate) fn transient(host: &str, reason: impl std::fmt::Display) -> Self {
        TimeError::TransientSyncFailure {
            host: host.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Problems found while loading the sunset dataset.
#[derive(Debug, Error, PartialEq)]
pub enum DatasetError {
    /// A single row was skipped; loading continues with the next one.
    #[error("line {line}: {reason}")]
    MalformedDatasetRow { line: usize, reason: String },
}
