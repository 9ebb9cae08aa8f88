//! Exponential backoff with jitter for transient provider failures.

use std::time::Duration;

use rand::Rng;

/// Tunable parameters for the retry strategy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `3` means up to four calls.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Un-jittered delay before retry number `retry` (0-based), clamped to
    /// [`max_delay`](Self::max_delay).
    pub fn backoff(&self, retry: u32) -> Duration {
        let mut delay = self.base_delay;
        for _ in 0..retry {
            delay = next_delay(delay, self);
        }
        delay.min(self.max_delay)
    }

    /// [`backoff`](Self::backoff) with "equal jitter": a uniformly random
    /// delay in `[backoff / 2, backoff]`.
    pub fn jittered(&self, retry: u32) -> Duration {
        let ceiling = self.backoff(retry);
        let floor = ceiling / 2;
        if ceiling <= floor {
            return ceiling;
        }
        rand::rng().random_range(floor..=ceiling)
    }
}

/// Calculate the next backoff delay from the current one.
///
/// The result is clamped to [`RetryPolicy::max_delay`].
pub fn next_delay(current: Duration, policy: &RetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}
