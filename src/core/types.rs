//! Shared data model: probe outcomes, transitions, journal records, breaker state.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// The family a target belongs to, as recorded in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Website,
    Database,
    /// The supervisor itself, for lifecycle records (`running`, `shutdown`, ...).
    Application,
}

impl std::fmt::Display for TargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetType::Website => "website",
            TargetType::Database => "database",
            TargetType::Application => "application",
        };
        write!(f, "{s}")
    }
}

/// Result of a single probe attempt (post retry/breaker), reduced to the shape the
/// state tracker and journal consume.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub target_name: String,
    pub healthy: bool,
    pub latency_seconds: f64,
    pub error: Option<String>,
    pub observed_at: DateTime<Local>,
}

impl ProbeOutcome {
    pub fn up(target_name: impl Into<String>, latency_seconds: f64) -> Self {
        Self {
            target_name: target_name.into(),
            healthy: true,
            latency_seconds,
            error: None,
            observed_at: Local::now(),
        }
    }

    pub fn down(target_name: impl Into<String>, latency_seconds: f64, error: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            healthy: false,
            latency_seconds,
            error: Some(error.into()),
            observed_at: Local::now(),
        }
    }

    /// The `"Response time: X.XXs"` / `"Error: ..."` detail string the journal records.
    pub fn detail(&self) -> String {
        match &self.error {
            Some(msg) => format!("Error: {msg}"),
            None => format!("Response time: {:.2}s", self.latency_seconds),
        }
    }

    pub fn status_literal(&self) -> &'static str {
        if self.healthy {
            "up"
        } else {
            "down"
        }
    }
}

/// The `status_change` shape a journal record carries: either a real
/// `from->to` transition, or a bare state literal for a "log all checks"
/// record that isn't itself a transition (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Transition { from: String, to: String },
    Literal(String),
}

impl StatusChange {
    pub fn render(&self) -> String {
        match self {
            StatusChange::Transition { from, to } => format!("{from}->{to}"),
            StatusChange::Literal(state) => state.clone(),
        }
    }
}

/// A symbolic status change or lifecycle event, destined for the journal.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    pub observed_at: DateTime<Local>,
    pub target_name: String,
    pub target_type: TargetType,
    pub change: StatusChange,
    pub detail: String,
}

impl TransitionEvent {
    pub fn status_change(&self) -> String {
        self.change.render()
    }
}

/// One line of the on-disk journal, per §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub timestamp: String,
    pub target_name: String,
    pub target_type: String,
    pub status_change: String,
    pub details: String,
}

impl From<&TransitionEvent> for JournalRecord {
    fn from(event: &TransitionEvent) -> Self {
        JournalRecord {
            timestamp: event.observed_at.to_rfc3339(),
            target_name: event.target_name.clone(),
            target_type: event.target_type.to_string(),
            status_change: event.status_change(),
            details: event.detail.clone(),
        }
    }
}

/// Three-state circuit breaker state, per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        write!(f, "{s}")
    }
}

/// A probe outcome paired with its breaker state, for the snapshot view
/// (§4.8: "name, status, latency, breaker state").
#[derive(Debug, Clone)]
pub struct TargetSnapshot {
    pub outcome: ProbeOutcome,
    pub breaker_state: BreakerState,
}

/// Counters tracked per target by the circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitState {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Local>>,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
        }
    }
}
