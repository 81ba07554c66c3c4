//! Retry of contended ledger transactions with exponential backoff

use std::future::Future;

use shared::InventoryError;

use crate::config::RetryConfig;
use crate::error::{AppError, AppResult};

/// Run `operation` until it succeeds, fails with a non-contention error, or
/// runs out of attempts. Exhausted contention surfaces as
/// `ConcurrencyConflict`.
pub async fn with_contention_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let max_attempts = config.max_attempts.max(1);

    for attempt in 0..max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Ledger transaction succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(e) if !e.is_contention() => return Err(e),
            Err(e) => {
                if attempt + 1 >= max_attempts {
                    tracing::warn!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "Ledger transaction contended, no more retries"
                    );
                    return Err(e.into_conflict());
                }

                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Ledger transaction contended, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    Err(AppError::Inventory(InventoryError::ConcurrencyConflict {
        message: format!("{} did not run", operation_name),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    fn conflict() -> AppError {
        AppError::Inventory(InventoryError::ConcurrencyConflict {
            message: "lock timeout".to_string(),
        })
    }

    #[test]
    fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = tokio_test::block_on(with_contention_retry(&fast(), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(conflict())
                } else {
                    Ok(n)
                }
            }
        }));

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_gives_up_with_conflict() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = tokio_test::block_on(with_contention_retry(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::from(sqlx::Error::PoolTimedOut)) }
        }));

        assert!(matches!(
            result,
            Err(AppError::Inventory(InventoryError::ConcurrencyConflict { .. }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_does_not_retry_caller_errors() {
        let calls = AtomicU32::new(0);
        let result: AppResult<()> = tokio_test::block_on(with_contention_retry(&fast(), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Inventory(InventoryError::invalid("boxes", "must be positive"))) }
        }));

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
