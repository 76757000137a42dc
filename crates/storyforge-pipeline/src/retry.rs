//! Transient-failure retry wrapper for external calls.
//!
//! Every node handler routes its external calls through [`with_retry`]. The
//! wrapper knows nothing about what a call does; it only classifies failures
//! via [`ForgeError::is_transient`] and applies exponential backoff with a
//! small jitter so concurrent runs do not retry in lockstep.

use std::time::Duration;

use rand::Rng;

use storyforge_types::{ForgeError, Result};

/// Backoff parameters for [`with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget, including the first call.
    pub max_attempts: usize,
    /// Base delay; attempt `i` sleeps `base * 2^i` plus jitter.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before the retry following failed attempt `attempt` (0-indexed):
    /// `base * 2^attempt + random(0, base/10)`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff = base_ms.saturating_mul(2u64.saturating_pow(attempt as u32));
        let jitter_cap = base_ms / 10;
        let jitter = if jitter_cap > 0 {
            rand::thread_rng().gen_range(0..=jitter_cap)
        } else {
            0
        };
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Run `call` until it succeeds, retrying only transient failures.
///
/// Non-transient errors are rethrown immediately with no sleep. Transient
/// errors sleep per the policy's backoff schedule and retry; once the attempt
/// budget is exhausted the last error is rethrown.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, call: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let budget = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 0..budget {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < budget => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    budget,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    // Unreachable with budget >= 1: the final attempt returns directly above.
    Err(last_err.unwrap_or_else(|| ForgeError::Other("retry budget exhausted".into())))
}
