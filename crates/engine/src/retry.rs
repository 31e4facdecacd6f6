use crate::error::EngineError;
use configuration::StoreConfig;
use database::DbError;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(store: &StoreConfig) -> Self {
        Self {
            max_retries: store.max_retries,
            base_delay: store.retry_base_delay,
        }
    }

    /// `base * 2^attempt`, saturating.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.min(16)))
    }
}

/// Runs a store operation, retrying transient failures with exponential backoff.
///
/// Non-transient errors are returned immediately. When the retries run out
/// the last transient error becomes [`EngineError::StoreUnavailable`].
pub async fn retry_with_backoff<T, F, Fut>(
    operation: &str,
    policy: RetryPolicy,
    mut attempt_fn: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut attempt = 0;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let delay = policy.delay(attempt);
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Store operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_transient() => {
                tracing::error!(operation, attempts = attempt + 1, error = %e, "Store operation failed permanently");
                return Err(EngineError::StoreUnavailable {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(EngineError::Database(e)),
        }
    }
}
