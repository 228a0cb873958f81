//! Conflict retry with exponential backoff and jitter
//!
//! Only optimistic-concurrency conflicts are retried here. Every other
//! failure goes straight back to the work queue.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::error::{Error, Result};

/// Backoff settings for conflicting writes
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            backoff_multiplier: 2.0,
        }
    }
}

/// Run `operation` until it succeeds, fails with something other than a
/// conflict, or `max_attempts` is exhausted.
///
/// Each attempt must re-read the object it writes; the closure is called
/// afresh for that reason.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e @ Error::Conflict { .. }) => {
                if attempt >= config.max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Conflict persisted after max retries"
                    );
                    return Err(e);
                }

                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    delay_ms = jittered_delay.as_millis(),
                    "Conflicting update, re-fetching and retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn conflict() -> Error {
        Error::conflict("Deployment", "default", "coordinator-deployment-g1")
    }

    #[tokio::test(start_paused = true)]
    async fn retries_conflicts_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry_on_conflict(&RetryConfig::default(), "test", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(conflict())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry_on_conflict(&RetryConfig::default(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(conflict())
        })
        .await;

        assert!(matches!(result, Err(Error::Conflict { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry_on_conflict(&RetryConfig::default(), "test", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::InvalidSpec("bad".into()))
        })
        .await;

        assert!(matches!(result, Err(Error::InvalidSpec(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
