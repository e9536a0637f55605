// ============================================================================
// Exponential Backoff
// ============================================================================
//
// wait_n = min(delay_n + U(0, jitter_ratio) * delay_n, max_delay)
// delay_{n+1} = min(delay_n * 2, max_delay)
//
// ============================================================================

use fraud_config::RetryConfig;
use fraud_error::ConnectionError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Infinite iterator of jittered waits
pub struct BackoffSchedule<R: Rng> {
    current: Duration,
    max: Duration,
    jitter_ratio: f64,
    rng: R,
}

impl BackoffSchedule<StdRng> {
    pub fn new(config: &RetryConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> BackoffSchedule<R> {
    pub fn with_rng(config: &RetryConfig, rng: R) -> Self {
        Self {
            current: config.initial_delay().min(config.max_delay()),
            max: config.max_delay(),
            jitter_ratio: config.jitter_ratio.clamp(0.0, 1.0),
            rng,
        }
    }
}

impl<R: Rng> Iterator for BackoffSchedule<R> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let base = self.current;
        let jitter = base.mul_f64(self.rng.gen_range(0.0..=self.jitter_ratio));
        let wait = base.saturating_add(jitter).min(self.max);

        self.current = base.saturating_mul(2).min(self.max);
        Some(wait)
    }
}

/// Run `operation` until it succeeds or `config.max_attempts` is reached
///
/// # Arguments
/// * `config` - Backoff parameters
/// * `operation_name` - Name used in logs and in the exhaustion error
/// * `operation` - Closure producing a fresh attempt
///
/// # Returns
/// The first successful value, or `ConnectionError::RetriesExhausted`
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ConnectionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut schedule = BackoffSchedule::new(config);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(
                        operation = operation_name,
                        attempt = attempt,
                        "Succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                last_error = e.to_string();
                if attempt == max_attempts {
                    break;
                }
                let wait = schedule.next().unwrap_or(config.max_delay());
                warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    retry_in_ms = wait.as_millis() as u64,
                    error = %e,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(wait).await;
            }
        }
    }

    Err(ConnectionError::RetriesExhausted {
        operation: operation_name.to_string(),
        attempts: max_attempts,
        last_error,
    })
}
