//! Bounded retry with a fixed delay
//!
//! Wraps a fallible async operation. Recoverable errors (see
//! [`MiddagErrorExt::is_recoverable`]) are retried up to `max_attempts`
//! total attempts with `delay` between them; non-recoverable errors fail
//! immediately. Exhaustion yields [`EngineError::RetriesExhausted`].

use sdk::errors::{EngineError, MiddagErrorExt};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RetryConfig;

/// Attempt budget and delay for one retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Single attempt, no waiting
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Run `action` until it succeeds, fails terminally, or the budget runs out.
///
/// `operation` names the action in logs and in the exhaustion error.
pub async fn retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut action: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EngineError>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;
        match action().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !e.is_recoverable() => {
                warn!(operation, attempt, error = %e, "Non-recoverable failure, not retrying");
                return Err(e);
            }
            Err(e) if attempt >= policy.max_attempts => {
                warn!(operation, attempts = attempt, error = %e, "Retries exhausted");
                return Err(EngineError::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: e.to_string(),
                });
            }
            Err(e) => {
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Attempt failed, retrying in {:?}",
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_first_time() {
        let calls = AtomicU32::new(0);
        let result = retry(fast(3), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, EngineError>(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry(fast(3), "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(EngineError::Network("reset".to_string()))
            } else {
                Ok("done")
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_is_terminal_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(fast(3), "send_message", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::transport(503, "unavailable"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(EngineError::RetriesExhausted {
                operation,
                attempts,
                ..
            }) => {
                assert_eq!(operation, "send_message");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_recoverable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry(fast(5), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::transport(401, "unauthorized"))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(EngineError::Transport { status: 401, .. })));
    }

    #[test]
    fn test_policy_needs_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
