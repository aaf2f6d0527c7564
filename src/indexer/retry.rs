//! Bounded exponential backoff with cancellable waits.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::IndexerError;

/// Retry schedule for block batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Wait before the second attempt.
    pub min_backoff: Duration,
    /// Upper bound on any single wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_backoff: Duration::from_secs(4),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Wait after the `failed_attempt`-th failure (1-based):
    /// `min(min_backoff * 2^(n-1), max_backoff)`.
    #[must_use]
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        let exponent = failed_attempt.saturating_sub(1).min(31);
        self.min_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff)
    }

    /// Runs `op` until it succeeds or attempts run out, sleeping between
    /// attempts. Returns the last error when every attempt fails.
    ///
    /// # Errors
    ///
    /// Returns the final attempt's error, or [`IndexerError::Shutdown`] if
    /// `token` is cancelled during a wait.
    pub async fn run<T, F, Fut>(
        &self,
        token: &CancellationToken,
        mut op: F,
    ) -> Result<T, IndexerError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, IndexerError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts || matches!(e, IndexerError::Shutdown) => {
                    return Err(e);
                }
                Err(e) => {
                    let wait = self.backoff(attempt);
                    tracing::warn!(attempt, error = %e, wait_ms = wait.as_millis() as u64, "attempt failed, retrying");
                    sleep_or_cancel(token, wait).await?;
                    attempt += 1;
                }
            }
        }
    }
}

/// Sleeps for `duration` unless `token` is cancelled first.
///
/// # Errors
///
/// Returns [`IndexerError::Shutdown`] on cancellation.
pub async fn sleep_or_cancel(
    token: &CancellationToken,
    duration: Duration,
) -> Result<(), IndexerError> {
    tokio::select! {
        () = token.cancelled() => Err(IndexerError::Shutdown),
        () = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
        assert_eq!(policy.backoff(3), Duration::from_secs(10));
        assert_eq!(policy.backoff(40), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let counter = Arc::clone(&calls);
        let result = RetryPolicy::default()
            .run(&token, move |_| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(IndexerError::Rpc("flaky".to_string()))
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        let Ok(value) = result else {
            panic!("third attempt succeeds");
        };
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let token = CancellationToken::new();
        let result: Result<(), IndexerError> = RetryPolicy::default()
            .run(&token, |attempt| async move {
                Err(IndexerError::Rpc(format!("attempt {attempt}")))
            })
            .await;
        let Err(IndexerError::Rpc(message)) = result else {
            panic!("last error propagates");
        };
        assert_eq!(message, "attempt 3");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let result: Result<(), IndexerError> = RetryPolicy::default()
            .run(&token, |_| async { Err(IndexerError::Rpc("down".to_string())) })
            .await;
        assert!(matches!(result, Err(IndexerError::Shutdown)));
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
