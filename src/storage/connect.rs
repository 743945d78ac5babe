//! Startup connection with bounded retry

use std::future::Future;
use std::time::Duration;

use super::StorageError;

/// Fixed-delay retry policy for reaching storage at startup
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// 12 attempts, 5 seconds apart: roughly a minute of waiting
    fn default() -> Self {
        Self {
            max_attempts: 12,
            delay: Duration::from_secs(5),
        }
    }
}

/// Run `connect` until it succeeds or the policy is exhausted
pub async fn connect_with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut connect: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        tracing::info!(attempt, max_attempts = attempts, "Connecting to storage");

        match connect().await {
            Ok(conn) => {
                tracing::info!(attempt, "Storage connection established");
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Storage connection failed");
                last_error = e.to_string();
            }
        }

        if attempt < attempts {
            tracing::info!("Retrying storage connection in {:?}", policy.delay);
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::error!("Max storage connection retries reached");
    Err(StorageError::RetriesExhausted {
        attempts,
        last_error,
    })
}
