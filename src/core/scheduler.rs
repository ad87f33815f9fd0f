//! Periodic fan-out: one tick probes every currently configured target through
//! its breaker+envelope, aggregates the results, and hands them to the state
//! tracker and journal. Grounded on `health_check_engine.py`'s `run_all_checks`
//! (parallel dispatch + `_update_statuses_and_log_changes` in one call).

use crate::config::Target;
use crate::core::circuit::{guarded_call, CircuitBreakerRegistry};
use crate::core::journal::Journal;
use crate::core::prober::Prober;
use crate::core::retry::{retry_with_backoff, RetryConfig};
use crate::core::self_metrics::SelfMetrics;
use crate::core::snapshot::View;
use crate::core::state_tracker::StateTracker;
use crate::core::types::{BreakerState, ProbeOutcome, TargetSnapshot, TargetType};
use crate::error::ErrorKind;
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

const MAX_CONCURRENT_PROBES: usize = 10;

pub struct Scheduler {
    http_prober: Arc<dyn Prober>,
    db_prober: Arc<dyn Prober>,
    http_breakers: Arc<CircuitBreakerRegistry>,
    db_breakers: Arc<CircuitBreakerRegistry>,
    semaphore: Arc<Semaphore>,
    state_tracker: Arc<StateTracker>,
    journal: Arc<Journal>,
    self_metrics: Arc<SelfMetrics>,
    view: Arc<dyn View>,
}

impl Scheduler {
    pub fn new(
        http_prober: Arc<dyn Prober>,
        db_prober: Arc<dyn Prober>,
        state_tracker: Arc<StateTracker>,
        journal: Arc<Journal>,
        self_metrics: Arc<SelfMetrics>,
        view: Arc<dyn View>,
    ) -> Self {
        use crate::core::circuit::BreakerConfig;
        Self {
            http_prober,
            db_prober,
            http_breakers: Arc::new(CircuitBreakerRegistry::new(BreakerConfig::http())),
            db_breakers: Arc::new(CircuitBreakerRegistry::new(BreakerConfig::database())),
            semaphore: Arc::new(Semaphore::new(MAX_CONCURRENT_PROBES)),
            state_tracker,
            journal,
            self_metrics,
            view,
        }
    }

    /// Drop breaker state for targets the latest reload removed (§4.7).
    pub fn retain_breakers_for(&self, live_names: &std::collections::HashSet<String>) {
        self.http_breakers.retain(live_names);
        self.db_breakers.retain(live_names);
    }

    pub fn open_breaker_count(&self) -> usize {
        self.http_breakers.open_count() + self.db_breakers.open_count()
    }

    /// Run exactly one tick: probe every target in `targets`, diff against
    /// prior state, write transitions to the journal, and publish a snapshot.
    pub async fn tick(&self, targets: &[Target], log_all_checks: bool) {
        self.self_metrics.update_target_count(targets.len());

        let mut handles = Vec::with_capacity(targets.len());
        for target in targets.iter().cloned() {
            let permit = Arc::clone(&self.semaphore);
            let (prober, breakers) = match &target {
                Target::Http(_) => (Arc::clone(&self.http_prober), Arc::clone(&self.http_breakers)),
                Target::Database(_) => {
                    (Arc::clone(&self.db_prober), Arc::clone(&self.db_breakers))
                }
            };
            let retry_config = match &target {
                Target::Http(_) => RetryConfig::http(),
                Target::Database(_) => RetryConfig::database(),
            };
            // §4.3/§7: HTTP only tracks transport-class (Retryable) failures
            // toward the breaker; a 4xx is Fatal and must not trip it. DB has
            // no separate transport/protocol split in its error model here,
            // so every non-CircuitOpen failure is driver-class and tracked.
            let is_tracked: fn(ErrorKind) -> bool = match &target {
                Target::Http(_) => |kind| kind == ErrorKind::Retryable,
                Target::Database(_) => |_kind| true,
            };
            let self_metrics = Arc::clone(&self.self_metrics);

            handles.push(tokio::spawn(async move {
                let _permit = permit
                    .acquire_owned()
                    .await
                    .expect("semaphore never closed");
                probe_target(target, prober, retry_config, breakers, is_tracked, self_metrics).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, target) in handles.into_iter().zip(targets.iter()) {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    self.self_metrics.add_diagnostic(
                        "scheduler",
                        crate::core::self_metrics::DiagnosticLevel::Error,
                        format!("worker task failed for \"{}\": {join_err}", target.name()),
                    );
                    outcomes.push(ProbeOutcome::down(
                        target.name().to_string(),
                        0.0,
                        format!("internal error: {join_err}"),
                    ));
                }
            }
        }

        self.self_metrics
            .update_open_breakers(self.open_breaker_count());

        let target_types: HashMap<String, TargetType> = targets
            .iter()
            .map(|t| (t.name().to_string(), t.target_type()))
            .collect();

        let events = self
            .state_tracker
            .apply_tick(outcomes, &target_types, log_all_checks);

        for event in &events {
            if let Err(e) = self.journal.append(event) {
                eprintln!("[ERROR] failed to write journal record: {e}");
                self.self_metrics.add_diagnostic(
                    "journal",
                    crate::core::self_metrics::DiagnosticLevel::Error,
                    e.to_string(),
                );
            }
        }

        let current = self.state_tracker.snapshot();
        let mut view_snapshot = HashMap::with_capacity(current.len());
        for (name, outcome) in current {
            let breaker_state = match target_types.get(&name) {
                Some(TargetType::Website) => self.http_breakers.state_of(&name),
                Some(TargetType::Database) => self.db_breakers.state_of(&name),
                _ => BreakerState::Closed,
            };
            view_snapshot.insert(name, TargetSnapshot { outcome, breaker_state });
        }
        self.view.on_snapshot(&view_snapshot);
    }
}

async fn probe_target(
    target: Target,
    prober: Arc<dyn Prober>,
    retry_config: RetryConfig,
    breakers: Arc<CircuitBreakerRegistry>,
    is_tracked: impl Fn(ErrorKind) -> bool,
    self_metrics: Arc<SelfMetrics>,
) -> ProbeOutcome {
    let name = target.name().to_string();
    let latency = Cell::new(0.0_f64);

    let result = guarded_call(&breakers, &name, is_tracked, || async {
        retry_with_backoff(
            &retry_config,
            |_attempt| {
                let prober = Arc::clone(&prober);
                let target = target.clone();
                let latency = &latency;
                async move {
                    let start = Instant::now();
                    let outcome = prober.attempt(&target).await;
                    latency.set(start.elapsed().as_secs_f64());
                    outcome
                }
            },
            || self_metrics.record_retry_attempt(),
        )
        .await
    })
    .await;

    let latency_seconds = latency.get();
    match result {
        Ok(()) => {
            self_metrics.record_probe(true, latency_seconds);
            ProbeOutcome::up(name, latency_seconds)
        }
        Err(e) => {
            self_metrics.record_probe(false, latency_seconds);
            ProbeOutcome::down(name, latency_seconds, e.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebsiteTarget;
    use crate::core::snapshot::ConsoleView;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;

    struct ScriptedProber {
        calls: AtomicUsize,
        // Queue of results to return, one per call; last one repeats once exhausted.
        script: StdMutex<Vec<Result<(), crate::error::ProbeError>>>,
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn attempt(&self, _target: &Target) -> Result<(), crate::error::ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn http_target(name: &str) -> Target {
        Target::Http(WebsiteTarget {
            name: name.to_string(),
            url: "https://example.test".to_string(),
            timeout: 10,
            expected_status: 200,
        })
    }

    #[tokio::test]
    async fn first_tick_emits_initial_unknown_to_up() {
        let dir = tempdir().unwrap();
        let journal = Arc::new(Journal::new(dir.path()).unwrap());
        let state_tracker = Arc::new(StateTracker::new());
        let self_metrics = Arc::new(SelfMetrics::new());
        let view = Arc::new(ConsoleView);

        let ok_prober: Arc<dyn Prober> = Arc::new(ScriptedProber {
            calls: AtomicUsize::new(0),
            script: StdMutex::new(vec![Ok(())]),
        });
        let db_prober: Arc<dyn Prober> = Arc::new(ScriptedProber {
            calls: AtomicUsize::new(0),
            script: StdMutex::new(vec![Ok(())]),
        });

        let scheduler = Scheduler::new(
            ok_prober,
            db_prober,
            Arc::clone(&state_tracker),
            Arc::clone(&journal),
            self_metrics,
            view,
        );

        scheduler.tick(&[http_target("A")], false).await;

        let entries = journal.entries_for_date(chrono::Local::now().date_naive());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status_change, "unknown->up");
    }
}
