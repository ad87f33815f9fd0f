//! Exponential backoff with full jitter around one probe attempt.

use crate::error::{ErrorKind, ProbeError};
use rand::Rng;
use std::time::Duration;

/// Backoff parameters for one target family. HTTP and DB probers each carry their
/// own defaults per SPEC_FULL.md §4.2.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn http() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs_f64(1.0),
            max_delay: Duration::from_secs_f64(10.0),
            backoff_multiplier: 2.0,
        }
    }

    pub fn database() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs_f64(2.0),
            max_delay: Duration::from_secs_f64(15.0),
            backoff_multiplier: 2.0,
        }
    }

    /// `min(cap, base * mult ^ attempt)` with ±25% jitter floored at 0.1s.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let raw = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jitter_range = capped * 0.25;
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        Duration::from_secs_f64((capped + jitter).max(0.1))
    }
}

/// Run `attempt` (an async probe call) with retry and exponential backoff.
/// Retries do not multiply the returned outcome: only the final attempt's result
/// reaches the caller. `on_retry` is invoked once per actual sleep, so the caller
/// can bump a self-metrics `retry_attempts` counter.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    mut attempt: F,
    mut on_retry: impl FnMut(),
) -> Result<T, ProbeError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, ProbeError>>,
{
    let mut last_err: Option<ProbeError> = None;
    for attempt_no in 0..config.max_attempts {
        match attempt(attempt_no).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let should_retry = err.kind == ErrorKind::Retryable
                    && attempt_no + 1 < config.max_attempts;
                last_err = Some(err);
                if !should_retry {
                    break;
                }
                on_retry();
                tokio::time::sleep(config.delay_for_attempt(attempt_no)).await;
            }
        }
    }
    Err(last_err.expect("at least one attempt always runs"))
}
