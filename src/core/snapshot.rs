//! Thread-safe read model: the view the core pushes full snapshots to after
//! each tick. Dashboard renderers are an out-of-scope collaborator (§9); this
//! module ships only the minimal stdout summary view.

use crate::core::types::TargetSnapshot;
use std::collections::HashMap;

/// One push per tick, internally consistent and totally ordered. The core
/// never calls a `View` concurrently with itself.
pub trait View: Send + Sync {
    fn on_snapshot(&self, snapshot: &HashMap<String, TargetSnapshot>);
}

/// Prints one line per target: name, status, latency, and breaker state.
pub struct ConsoleView;

impl View for ConsoleView {
    fn on_snapshot(&self, snapshot: &HashMap<String, TargetSnapshot>) {
        let mut names: Vec<&String> = snapshot.keys().collect();
        names.sort();
        for name in names {
            let entry = &snapshot[name];
            let status = entry.outcome.status_literal();
            let breaker = entry.breaker_state;
            match &entry.outcome.error {
                Some(err) => println!(
                    "{name:<24} {status:<6} {:>7.2}s  [{breaker}]  {err}",
                    entry.outcome.latency_seconds
                ),
                None => println!(
                    "{name:<24} {status:<6} {:>7.2}s  [{breaker}]",
                    entry.outcome.latency_seconds
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn console_view_does_not_panic_on_empty_snapshot() {
        let view = ConsoleView;
        view.on_snapshot(&HashMap::new());
    }
}
