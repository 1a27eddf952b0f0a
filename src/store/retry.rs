use std::future::Future;
use std::time::Duration;

use log::{error, warn};

use super::StoreError;

/// Bounded exponential backoff for transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        }
    }
}

impl RetryPolicy {
    /// Preset for counter transactions: shorter delays, contention resolves
    /// quickly once the competing transaction commits.
    pub fn transaction() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }
}

/// Runs `op`, retrying retryable [`StoreError`]s with exponential backoff.
/// Non-retryable errors are returned immediately.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut delay = policy.initial_delay;
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => {
                if attempt < policy.max_attempts {
                    warn!(
                        "Store operation '{operation}' failed (attempt {attempt}/{}): {e}. Retrying in {delay:?}",
                        policy.max_attempts
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(policy.max_delay);
                } else {
                    error!(
                        "Store operation '{operation}' failed after {} attempts: {e}",
                        policy.max_attempts
                    );
                }
                last_error = Some(e);
            }
            Err(e) => {
                error!("Store operation '{operation}' failed with non-retryable error: {e}");
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| StoreError::Internal("retry loop without attempts".into())))
}
