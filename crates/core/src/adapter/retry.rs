use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::adapter::AdapterError;
use crate::config::AdapterRetryConfig;

/// Bounded exponential backoff for adapter calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    /// Deadline for a single attempt. Expiry counts as a transient failure.
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            multiplier: 2,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&AdapterRetryConfig> for RetryPolicy {
    fn from(config: &AdapterRetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            multiplier: config.backoff_multiplier,
            call_timeout: Duration::from_secs(config.call_timeout_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based count of failed attempts).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Run `call` until it succeeds, fails fatally, or attempts run out. The last
/// transient error is returned when retries are exhausted.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: F,
) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AdapterError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = match tokio::time::timeout(policy.call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::transient(format!(
                "{operation} timed out after {}ms",
                policy.call_timeout.as_millis()
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    event_name = "adapter.call_retrying",
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient adapter failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::{call_with_retry, RetryPolicy};
    use crate::adapter::AdapterError;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            multiplier: 2,
            call_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
        assert_eq!(policy.delay_after(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&fast_policy(), "create_or_update_buy", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(AdapterError::transient("503 from upstream"))
                } else {
                    Ok("ORD-1")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("ORD-1"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&fast_policy(), "sync_creatives", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AdapterError::fatal("invalid credentials")) }
        })
        .await;

        assert_eq!(result, Err(AdapterError::fatal("invalid credentials")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_last_transient_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = call_with_retry(&fast_policy(), "fetch_delivery_metrics", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Err(AdapterError::transient(format!("attempt {attempt} throttled"))) }
        })
        .await;

        assert_eq!(result, Err(AdapterError::transient("attempt 3 throttled")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_call_times_out_as_transient() {
        let policy = RetryPolicy { max_attempts: 1, call_timeout: Duration::from_millis(5), ..fast_policy() };
        let result: Result<(), _> = call_with_retry(&policy, "health_check", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(AdapterError::Transient { .. })));
    }
}
