//! Timeout utilities for page operations
//!
//! Every CDP round-trip can hang on a misbehaving page, so each one goes
//! through [`with_page_timeout`].

use std::future::Future;
use std::time::Duration;

use super::errors::{ExtractionError, ExtractionResult};

/// Wrap an async page operation with an explicit timeout
///
/// # Returns
/// * `Ok(T)` - Operation completed successfully
/// * `Err(ExtractionError::Timeout)` - The timeout was reached
/// * `Err(_)` - The operation's own error
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> ExtractionResult<T>
where
    F: Future<Output = ExtractionResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(ExtractionError::Timeout {
            operation: operation_name.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_operation_times_out() {
        let result: ExtractionResult<()> = with_page_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            },
            Duration::from_secs(1),
            "Page navigation",
        )
        .await;

        match result {
            Err(ExtractionError::Timeout { operation, timeout_ms }) => {
                assert_eq!(operation, "Page navigation");
                assert_eq!(timeout_ms, 1_000);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let result: ExtractionResult<()> = with_page_timeout(
            async { Err(ExtractionError::Browser("gone".into())) },
            Duration::from_secs(1),
            "Reload",
        )
        .await;
        assert!(matches!(result, Err(ExtractionError::Browser(_))));
    }
}
