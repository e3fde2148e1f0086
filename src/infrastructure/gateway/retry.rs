//! Bounded retry with a fixed delay between attempts

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::shared::errors::{GatewayError, StoreError};
use crate::shared::types::RetryConfig;

/// How many times to run an operation and how long to wait in between.
/// Operations handed to the policy must be safe to run more than once.
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
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.delay_ms))
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the policy's
/// attempts are used up. The wait is a `tokio::time::sleep`, so other tasks keep running.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(source) if !source.is_retryable() => {
                return Err(GatewayError::NonRetryable {
                    operation: operation.to_string(),
                    source,
                });
            }
            Err(source) if attempt >= policy.max_attempts => {
                return Err(GatewayError::RetryExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source,
                });
            }
            Err(source) => {
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %source,
                    "Store operation failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
