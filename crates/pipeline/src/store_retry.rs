//! Bounded retry for store calls made by background stages.
//!
//! Only [`StoreError::is_transient`] failures are repeated, with the same
//! jittered exponential backoff the deploy client uses. Conflicts and
//! validation failures return on the first attempt.

use std::future::Future;
use std::time::Duration;

use launchpad_db::StoreError;
use launchpad_hosting::RetryPolicy;

#[derive(Debug, Clone)]
pub(crate) struct StoreRetry {
    policy: RetryPolicy,
}

impl StoreRetry {
    pub(crate) fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Calls allowed in total, the first one included.
    pub(crate) fn max_attempts(&self) -> u32 {
        self.policy.max_retries + 1
    }

    /// Jittered delay before retry number `retry` (0-based).
    pub(crate) fn delay(&self, retry: u32) -> Duration {
        self.policy.jittered(retry)
    }

    /// Run `call`, repeating it while it fails transiently.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.compare_and_set(operation, call, || async { Ok(None) })
            .await
    }

    /// Like [`run`](Self::run) for a compare-and-set.
    ///
    /// A timed-out write may still have landed, so a conflict on a repeated
    /// call consults `landed`: `Some(record)` means the record already holds
    /// what this call wrote, and is returned as success.
    pub(crate) async fn compare_and_set<T, F, Fut, L, LFut>(
        &self,
        operation: &'static str,
        mut call: F,
        landed: L,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
        L: FnOnce() -> LFut,
        LFut: Future<Output = Result<Option<T>, StoreError>>,
    {
        let mut retry = 0u32;
        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if err.is_conflict() && retry > 0 {
                return match landed().await? {
                    Some(value) => {
                        tracing::debug!(operation, "Earlier attempt had landed");
                        Ok(value)
                    }
                    None => Err(err),
                };
            }
            if !err.is_transient() || retry >= self.policy.max_retries {
                return Err(err);
            }

            let delay = self.delay(retry);
            retry += 1;
            tracing::warn!(
                operation,
                attempt = retry,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient store error, retrying",
            );
            tokio::time::sleep(delay).await;
        }
    }
}
