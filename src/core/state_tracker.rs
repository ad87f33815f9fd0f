//! Transition detection: the only writer of `current` and `previous_healthy`.

use crate::core::types::{ProbeOutcome, StatusChange, TargetType, TransitionEvent};
use chrono::Local;
use std::collections::HashMap;
use std::sync::Mutex;

struct Inner {
    current: HashMap<String, ProbeOutcome>,
    previous_healthy: HashMap<String, bool>,
}

/// Holds `current[name]` and `previous_healthy[name]` behind one mutex, per
/// §4.5/§5 ("state tracker and self-metrics are guarded by their own mutexes").
/// `previous_healthy` is never cleared on reload — that's what makes the
/// "reload doesn't re-emit unknown->..." design decision (§9) hold.
pub struct StateTracker {
    inner: Mutex<Inner>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                current: HashMap::new(),
                previous_healthy: HashMap::new(),
            }),
        }
    }

    /// Diff one tick's aggregated outcomes against prior state. Returns the
    /// transitions to journal (in no particular cross-target order) and, if
    /// `log_all_checks` is set, one additional non-transition record per probe.
    pub fn apply_tick(
        &self,
        outcomes: Vec<ProbeOutcome>,
        target_types: &HashMap<String, TargetType>,
        log_all_checks: bool,
    ) -> Vec<TransitionEvent> {
        let mut inner = self.inner.lock().expect("state tracker mutex poisoned");
        let mut events = Vec::new();

        for outcome in &outcomes {
            let target_type = target_types
                .get(&outcome.target_name)
                .copied()
                .unwrap_or(TargetType::Application);
            let previous = inner.previous_healthy.get(&outcome.target_name).copied();

            if previous.is_none() || previous != Some(outcome.healthy) {
                let from_state = match previous {
                    None => "unknown",
                    Some(true) => "up",
                    Some(false) => "down",
                };
                events.push(TransitionEvent {
                    observed_at: outcome.observed_at,
                    target_name: outcome.target_name.clone(),
                    target_type,
                    change: StatusChange::Transition {
                        from: from_state.to_string(),
                        to: outcome.status_literal().to_string(),
                    },
                    detail: outcome.detail(),
                });
            }

            if log_all_checks {
                events.push(TransitionEvent {
                    observed_at: outcome.observed_at,
                    target_name: outcome.target_name.clone(),
                    target_type,
                    change: StatusChange::Literal(outcome.status_literal().to_string()),
                    detail: outcome.detail(),
                });
            }
        }

        for outcome in outcomes {
            inner
                .previous_healthy
                .insert(outcome.target_name.clone(), outcome.healthy);
            inner.current.insert(outcome.target_name.clone(), outcome);
        }

        events
    }

    /// A defensive copy of the current per-target status, for the snapshot view.
    pub fn snapshot(&self) -> HashMap<String, ProbeOutcome> {
        self.inner
            .lock()
            .expect("state tracker mutex poisoned")
            .current
            .clone()
    }

    /// Wipe all in-memory status, used between test runs and by `--once`
    /// callers that want a clean slate (supplemented from `clear_statuses`).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("state tracker mutex poisoned");
        inner.current.clear();
        inner.previous_healthy.clear();
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
