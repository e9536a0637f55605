// ============================================================================
// Broker Retry Configuration
// ============================================================================

use crate::constants::*;
use crate::env_parse;
use std::time::Duration;

/// Exponential backoff parameters for broker connection attempts
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Delay before the second attempt
    pub initial_delay_ms: u64,
    /// Upper bound for any single wait (jitter included)
    pub max_delay_ms: u64,
    /// Total attempts before giving up
    pub max_attempts: u32,
    /// Fraction of the current delay added as uniform random jitter (0.0..=1.0)
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_RETRY_INITIAL_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_MS,
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            jitter_ratio: DEFAULT_RETRY_JITTER_RATIO,
        }
    }
}

impl RetryConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            initial_delay_ms: env_parse("AMQP_RETRY_INITIAL_MS", defaults.initial_delay_ms),
            max_delay_ms: env_parse("AMQP_RETRY_MAX_MS", defaults.max_delay_ms),
            max_attempts: env_parse("AMQP_RETRY_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            jitter_ratio: env_parse("AMQP_RETRY_JITTER_RATIO", defaults.jitter_ratio)
                .clamp(0.0, 1.0),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}
