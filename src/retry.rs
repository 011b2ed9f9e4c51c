//! Bounded exponential backoff for [`crate::Error::TransientBackend`] retries.

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy for transient backend failures (spec §7): base 250ms,
/// factor 2, at most 3 attempts, ±20% jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            factor: 2.0,
            jitter: 0.20,
        }
    }
}

impl RetryPolicy {
    fn delay_for_attempt(&self, attempt: u32, jitter_sample: f64) -> Duration {
        let base = self.base_delay_ms as f64 * self.factor.powi(attempt as i32);
        let jitter_span = base * self.jitter;
        // jitter_sample is expected in [-1.0, 1.0]
        let jittered = (base + jitter_span * jitter_sample).max(0.0);
        Duration::from_millis(jittered.round() as u64)
    }
}

/// A deterministic jitter source so retry delays are reproducible in tests.
/// Production callers use [`system_jitter`]; tests can inject a fixed value.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Jitter derived from the low bits of the monotonic clock. Not
/// cryptographically random, which is fine: this only smooths retry
/// stampedes, it is not security-sensitive.
pub struct SystemJitter;

impl JitterSource for SystemJitter {
    fn sample(&self) -> f64 {
        let nanos = std::time::Instant::now().elapsed().subsec_nanos() as f64;
        (nanos % 1000.0) / 500.0 - 1.0
    }
}

/// Run `op` with bounded exponential backoff. Only [`Error::TransientBackend`]
/// is retried; every other error kind is returned immediately. If every
/// attempt fails, the last `TransientBackend` error is returned.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_jittered(policy, &SystemJitter, op).await
}

/// As [`with_retry`], but with an explicit jitter source (used by tests to
/// make delay assertions deterministic).
pub async fn with_retry_jittered<T, F, Fut>(
    policy: RetryPolicy,
    jitter: &dyn JitterSource,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(Error::TransientBackend(msg)) => {
                attempt += 1;
                if attempt >= policy.max_attempts {
                    return Err(Error::TransientBackend(msg));
                }
                let delay = policy.delay_for_attempt(attempt - 1, jitter.sample());
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, "retrying transient backend error: {msg}");
                tokio::time::sleep(delay).await;
            }
            Err(other) => return Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ZeroJitter;
    impl JitterSource for ZeroJitter {
        fn sample(&self) -> f64 {
            0.0
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_ok() {
        let calls = AtomicU32::new(0);
        let result = with_retry_jittered(RetryPolicy::default(), &ZeroJitter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Error>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_max_attempts_then_surfaces_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            factor: 1.0,
            jitter: 0.0,
        };
        let result: Result<i32> = with_retry_jittered(policy, &ZeroJitter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::TransientBackend("boom".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = with_retry_jittered(RetryPolicy::default(), &ZeroJitter, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::NotFound("x".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
