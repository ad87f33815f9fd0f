//! Per-target three-state circuit breaker.
//!
//! The breaker's lock is held only around state transitions, never across the
//! probe itself — the probe (and its retry envelope) run lock-free so that one
//! slow target never blocks state updates for unrelated targets (§5).

use crate::core::types::{BreakerState, CircuitState};
use crate::error::{ErrorKind, ProbeError};
use chrono::Local;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl BreakerConfig {
    pub fn http() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    pub fn database() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(120),
        }
    }
}

fn should_attempt_reset(state: &CircuitState, config: &BreakerConfig) -> bool {
    match state.last_failure_at {
        None => true,
        Some(last) => {
            let elapsed = Local::now().signed_duration_since(last);
            elapsed
                >= chrono::Duration::from_std(config.recovery_timeout)
                    .unwrap_or(chrono::Duration::zero())
        }
    }
}

/// Per-target breakers, keyed by name, guarded by one mutex that is never held
/// across an `.await`.
pub struct CircuitBreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, CircuitState>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Checks whether a call for `target_name` may proceed. `Open` with an
    /// elapsed recovery timeout transitions to `HalfOpen` and permits exactly
    /// one call through; a still-`Open` breaker fails fast with no probe.
    pub fn try_acquire(&self, target_name: &str) -> Result<(), ProbeError> {
        let mut breakers = self.breakers.lock().expect("breaker registry poisoned");
        let state = breakers.entry(target_name.to_string()).or_default();

        if state.state == BreakerState::Open {
            if should_attempt_reset(state, &self.config) {
                state.state = BreakerState::HalfOpen;
            } else {
                return Err(ProbeError::circuit_open(format!(
                    "circuit breaker open for \"{target_name}\""
                )));
            }
        }
        Ok(())
    }

    /// Record success: closes the breaker and resets the failure tally.
    fn record_success(&self, target_name: &str) {
        let mut breakers = self.breakers.lock().expect("breaker registry poisoned");
        let state = breakers.entry(target_name.to_string()).or_default();
        state.state = BreakerState::Closed;
        state.consecutive_failures = 0;
    }

    /// Record a tracked failure: bumps the tally and trips the breaker at
    /// `failure_threshold`.
    fn record_tracked_failure(&self, target_name: &str) {
        let mut breakers = self.breakers.lock().expect("breaker registry poisoned");
        let state = breakers.entry(target_name.to_string()).or_default();
        state.consecutive_failures += 1;
        state.last_failure_at = Some(Local::now());
        if state.consecutive_failures >= self.config.failure_threshold {
            state.state = BreakerState::Open;
        }
    }

    pub fn state_of(&self, target_name: &str) -> BreakerState {
        self.breakers
            .lock()
            .expect("breaker registry poisoned")
            .get(target_name)
            .map(|s| s.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// Drop breaker state for targets no longer present in the configuration.
    pub fn retain(&self, live_names: &std::collections::HashSet<String>) {
        self.breakers
            .lock()
            .expect("breaker registry poisoned")
            .retain(|name, _| live_names.contains(name));
    }

    pub fn open_count(&self) -> usize {
        self.breakers
            .lock()
            .expect("breaker registry poisoned")
            .values()
            .filter(|s| s.state == BreakerState::Open)
            .count()
    }

    #[cfg(test)]
    fn force_last_failure_at(&self, target_name: &str, at: chrono::DateTime<Local>) {
        let mut breakers = self.breakers.lock().unwrap();
        breakers.entry(target_name.to_string()).or_default().last_failure_at = Some(at);
    }
}

/// Run `call` through the breaker for `target_name`: fails fast if the breaker
/// denies it, otherwise runs `call` lock-free and records the outcome.
///
/// Only failures `is_tracked` accepts count toward the breaker (§4.3/§7: HTTP
/// tracks transport-class failures only; DB tracks driver-class failures). A
/// non-tracked failure — e.g. an HTTP 4xx, classified `Fatal` — neither trips
/// nor resets the breaker. A `CircuitOpen` result from `try_acquire` never
/// reaches `is_tracked`/`record_*`: it short-circuits before `call` runs.
pub async fn guarded_call<T, F, Fut>(
    registry: &CircuitBreakerRegistry,
    target_name: &str,
    is_tracked: impl Fn(ErrorKind) -> bool,
    call: F,
) -> Result<T, ProbeError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProbeError>>,
{
    registry.try_acquire(target_name)?;
    let result = call().await;
    match &result {
        Ok(_) => registry.record_success(target_name),
        Err(e) if is_tracked(e.kind) => registry.record_tracked_failure(target_name),
        Err(_) => {}
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 3,
            recovery_timeout: Duration::from_millis(50),
        }
    }

    /// HTTP-style tracking: only `Retryable` (transport-class) failures count.
    fn track_retryable_only(kind: ErrorKind) -> bool {
        kind == ErrorKind::Retryable
    }

    /// DB-style tracking: every non-`CircuitOpen` failure is driver-class.
    fn track_all(_kind: ErrorKind) -> bool {
        true
    }

    #[tokio::test]
    async fn stays_closed_below_threshold() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..2 {
            let _ = guarded_call(&registry, "t", track_all, || async {
                Err::<(), _>(ProbeError::retryable("x"))
            })
            .await;
        }
        assert_eq!(registry.state_of("t"), BreakerState::Closed);
    }

    #[tokio::test]
    async fn opens_at_threshold_and_fast_fails() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            let _ = guarded_call(&registry, "t", track_all, || async {
                Err::<(), _>(ProbeError::retryable("x"))
            })
            .await;
        }
        assert_eq!(registry.state_of("t"), BreakerState::Open);

        let mut invoked = false;
        let result = guarded_call(&registry, "t", track_all, || {
            invoked = true;
            async { Ok(()) }
        })
        .await;
        assert!(result.is_err());
        assert!(!invoked, "prober must not run while breaker is open");
        assert_eq!(
            result.unwrap_err().kind,
            crate::error::ErrorKind::CircuitOpen
        );
    }

    #[tokio::test]
    async fn half_opens_after_recovery_timeout_then_closes_on_success() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            let _ = guarded_call(&registry, "t", track_all, || async {
                Err::<(), _>(ProbeError::retryable("x"))
            })
            .await;
        }
        assert_eq!(registry.state_of("t"), BreakerState::Open);

        registry.force_last_failure_at("t", Local::now() - chrono::Duration::seconds(1));

        let result = guarded_call(&registry, "t", track_all, || async { Ok::<_, ProbeError>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(registry.state_of("t"), BreakerState::Closed);
    }

    #[tokio::test]
    async fn circuit_open_result_does_not_reset_failure_count() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..3 {
            let _ = guarded_call(&registry, "t", track_all, || async {
                Err::<(), _>(ProbeError::retryable("x"))
            })
            .await;
        }
        assert_eq!(registry.state_of("t"), BreakerState::Open);
        let _ = guarded_call(&registry, "t", track_all, || async { Ok::<_, ProbeError>(()) }).await;
        assert_eq!(registry.state_of("t"), BreakerState::Open);
    }

    #[tokio::test]
    async fn non_tracked_failure_neither_trips_nor_resets_the_breaker() {
        let registry = CircuitBreakerRegistry::new(config());
        for _ in 0..2 {
            let _ = guarded_call(&registry, "t", track_all, || async {
                Err::<(), _>(ProbeError::retryable("x"))
            })
            .await;
        }
        // A sustained HTTP 4xx is `Fatal`, not transport-class: with
        // HTTP-style tracking it must not push the breaker to the threshold.
        for _ in 0..10 {
            let _ = guarded_call(&registry, "t", track_retryable_only, || async {
                Err::<(), _>(ProbeError::fatal("404 not found"))
            })
            .await;
        }
        assert_eq!(registry.state_of("t"), BreakerState::Closed);

        // Nor does it reset a tally that was already building from tracked
        // failures.
        let _ = guarded_call(&registry, "t", track_retryable_only, || async {
            Err::<(), _>(ProbeError::retryable("x"))
        })
        .await;
        assert_eq!(registry.state_of("t"), BreakerState::Open);
    }

    #[test]
    fn registry_retains_only_live_targets() {
        let registry = CircuitBreakerRegistry::new(config());
        registry.try_acquire("a").unwrap();
        registry.try_acquire("b").unwrap();
        let live: std::collections::HashSet<String> = ["a".to_string()].into_iter().collect();
        registry.retain(&live);
        assert_eq!(registry.open_count(), 0);
        assert_eq!(registry.breakers.lock().unwrap().len(), 1);
    }
}
