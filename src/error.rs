//! Error taxonomy for the monitor.
//!
//! Mirrors the layering used elsewhere in this codebase for network errors: one
//! `thiserror`-derived enum per boundary, `Display` text meant for an operator to
//! read directly, and `From` conversions at the edges that need them.

use std::path::PathBuf;

/// Top-level error returned from supervisor setup and `main`.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("initialization failed: {0}")]
    Init(String),
}

/// Errors raised while loading or validating the declared target set.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(PathBuf),
    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Validation(String),
}

/// How a failed probe attempt should be treated by the retry envelope and breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Worth retrying; counts toward the breaker's failure tally.
    Retryable,
    /// Not worth retrying. Counted toward the breaker only for driver-class faults.
    Fatal,
    /// The breaker is open; no probe was attempted.
    CircuitOpen,
}

/// The classification a prober attempt exchanges with the envelope/breaker in place
/// of throwing, per the "exceptions as explicit classification" design note.
#[derive(Debug, Clone)]
pub struct ProbeError {
    pub message: String,
    pub kind: ErrorKind,
}

impl ProbeError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Retryable,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::Fatal,
        }
    }

    pub fn circuit_open(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ErrorKind::CircuitOpen,
        }
    }
}

impl std::fmt::Display for ProbeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ProbeError {}

/// Errors from the journal sink. Logged to stderr and counted; never propagated
/// past the journal module boundary into the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to serialize journal record: {0}")]
    Serialize(#[from] serde_json::Error),
}
