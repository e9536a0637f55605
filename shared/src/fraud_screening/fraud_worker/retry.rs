// ============================================================================
// Store Retry Envelope
// ============================================================================
//
// Every Redis round trip runs inside this envelope: a per-call timeout,
// a bounded number of attempts and exponential backoff between them.
// Reconnection itself is handled by the redis ConnectionManager, so a retry
// after a dropped socket lands on a fresh connection. Only transport errors
// and timeouts are retried; a reply Redis rejected is returned at once.
//
// ============================================================================

use fraud_config::StoreConfig;
use fraud_error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Errors worth another attempt: the request may not have reached Redis
pub(crate) fn is_transient(error: &redis::RedisError) -> bool {
    error.is_io_error()
        || error.is_timeout()
        || error.is_connection_dropped()
        || error.is_connection_refusal()
}

/// Execute a Redis operation with timeout and retry
///
/// # Arguments
/// * `config` - Store configuration (timeout, attempts, initial backoff)
/// * `operation_name` - Name of the operation for logging
/// * `operation` - Closure producing a fresh future per attempt
///
/// # Returns
/// The operation result, or a `StoreError` once all attempts are exhausted.
/// With a single-attempt budget the underlying error is returned as-is.
pub async fn execute_with_retry<F, Fut, T>(
    config: &StoreConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, redis::RedisError>>,
{
    let max_attempts = config.op_max_attempts.max(1);
    let timeout = config.op_timeout();
    let mut last_error: Option<StoreError> = None;

    for attempt in 1..=max_attempts {
        let error = match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(result)) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt = attempt,
                        "Redis operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Ok(Err(e)) if !is_transient(&e) => {
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    error = %e,
                    "Redis operation rejected, not retrying"
                );
                return Err(StoreError::Redis(e));
            }
            Ok(Err(e)) => StoreError::Redis(e),
            Err(_) => StoreError::Timeout {
                operation: operation_name.to_string(),
                timeout,
            },
        };

        warn!(
            operation = operation_name,
            attempt = attempt,
            max_attempts = max_attempts,
            error = %error,
            "Redis operation failed"
        );

        if attempt < max_attempts {
            let backoff_ms = config
                .op_initial_backoff_ms
                .saturating_mul(2_u64.saturating_pow(attempt - 1));
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        }
        last_error = Some(error);
    }

    match last_error {
        Some(error) if max_attempts == 1 => Err(error),
        Some(error) => Err(StoreError::RetriesExhausted {
            operation: operation_name.to_string(),
            attempts: max_attempts,
            last_error: error.to_string(),
        }),
        None => Err(StoreError::RetriesExhausted {
            operation: operation_name.to_string(),
            attempts: 0,
            last_error: "no attempt made".to_string(),
        }),
    }
}
