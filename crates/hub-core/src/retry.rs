//! Jittered exponential backoff (C8, §4.8), usable as a decorator around
//! C1 (bus), C3 (persistence), and C6 (engine) operations.
//!
//! Grounded on `original_source/src/lab_orchestrator/retry.py`'s
//! `RetryConfig.calculate_delay` and its `MQTT_RETRY_CONFIG` /
//! `DATABASE_RETRY_CONFIG` presets, and on `tobert-hootenanny`'s
//! `LazyPirateConfig` builder shape.

use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub exponential_base: f64,
    pub jitter: bool,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            exponential_base: 2.0,
            jitter: true,
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Preset used by the bus client (C1) for reconnects/publishes.
    pub fn mqtt_default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            exponential_base: 2.0,
            jitter: true,
            jitter_factor: 0.1,
        }
    }

    /// Preset used by the persistence gateway (C3).
    pub fn database_default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: true,
            jitter_factor: 0.1,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Delay before the `attempt`-th retry (1-indexed: `attempt=1` is the
    /// first retry after the initial try fails). `min(base * exp^(n-1),
    /// max)`, plus uniform jitter in `±jitter_factor * delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64() * self.exponential_base.powi(attempt as i32 - 1);
        let capped = base.min(self.max_delay.as_secs_f64());
        let delay = if self.jitter && capped > 0.0 {
            let jitter_range = capped * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped + jitter).max(0.0)
        } else {
            capped
        };
        Duration::from_secs_f64(delay)
    }
}

/// Raised when all attempts of a retriable operation are exhausted (§4.8).
#[derive(Debug, Clone, thiserror::Error)]
#[error("operation failed after {attempts} attempt(s): {last_error}")]
pub struct RetryError {
    pub attempts: u32,
    pub last_error: String,
}

/// Run `op` under `policy`, retrying while `is_retriable` returns true for the
/// error. Non-retriable errors short-circuit immediately without sleeping.
pub async fn retry_async<T, E, Fut, F, C>(policy: &RetryPolicy, mut op: F, is_retriable: C) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    C: Fn(&E) -> bool,
{
    let mut last_error = String::new();
    for attempt in 1..=policy.max_attempts.max(1) {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                last_error = err.to_string();
                if !is_retriable(&err) {
                    return Err(RetryError { attempts: attempt, last_error });
                }
                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }
    Err(RetryError { attempts: policy.max_attempts, last_error })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_and_caps_at_max_without_jitter() {
        let policy = RetryPolicy { jitter: false, ..RetryPolicy::mqtt_default() };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        // attempt 7 would be 500ms * 2^6 = 32s, capped to 30s
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_configured_factor() {
        let policy = RetryPolicy::mqtt_default();
        for attempt in 1..=5 {
            let delay = policy.delay_for_attempt(attempt).as_secs_f64();
            let base = (0.5_f64 * 2.0_f64.powi(attempt as i32 - 1)).min(30.0);
            let range = base * policy.jitter_factor;
            assert!(delay >= (base - range).max(0.0) - 1e-9);
            assert!(delay <= base + range + 1e-9);
        }
    }

    #[tokio::test]
    async fn non_retriable_error_short_circuits_without_retrying() {
        let policy = RetryPolicy::default().with_max_attempts(5);
        let mut calls = 0;
        let result = retry_async(
            &policy,
            |_attempt| {
                calls += 1;
                async { Err::<(), &str>("fatal") }
            },
            |_e| false,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retriable_error_exhausts_all_attempts_then_fails() {
        let policy = RetryPolicy { max_attempts: 3, jitter: false, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), ..RetryPolicy::default() };
        let mut calls = 0;
        let result = retry_async(
            &policy,
            |_attempt| {
                calls += 1;
                async { Err::<(), &str>("transient") }
            },
            |_e| true,
        )
        .await;
        assert_eq!(calls, 3);
        assert_eq!(result.unwrap_err().attempts, 3);
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy { max_attempts: 3, jitter: false, base_delay: Duration::from_millis(1), max_delay: Duration::from_millis(2), ..RetryPolicy::default() };
        let mut calls = 0;
        let result = retry_async(
            &policy,
            |attempt| {
                calls += 1;
                async move { if attempt < 2 { Err("transient") } else { Ok(42) } }
            },
            |_e| true,
        )
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }
}
