// ============================================================================
// Fraud Config - Centralized configuration management
// ============================================================================
//
// Configuration for the fraud screening worker.
// Loaded from environment variables (and an optional .env file) with
// defaults that match the docker-compose deployment.
//
// ============================================================================

mod constants;
mod rabbitmq;
mod redis;
mod retry;

pub use constants::{SECONDS_PER_DAY, SECONDS_PER_HOUR};
pub use rabbitmq::RabbitMqConfig;
pub use redis::{RedisKeyPrefixes, StoreConfig};
pub use retry::RetryConfig;

use anyhow::{Context, Result};
use constants::*;
use std::str::FromStr;

/// Fraud rule parameters
#[derive(Clone, Debug)]
pub struct FraudPolicyConfig {
    /// Amounts strictly greater than this are flagged
    pub threshold: f64,
}

impl Default for FraudPolicyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FRAUD_THRESHOLD,
        }
    }
}

/// Main configuration structure for the fraud screening worker
#[derive(Clone, Debug)]
pub struct Config {
    pub redis_url: String,
    /// Interface the health and metrics servers bind to
    pub bind_host: String,
    pub health_port: u16,
    pub metrics_port: u16,
    /// Pause between consume-loop restarts after a fatal broker error
    pub supervisor_restart_secs: u64,
    pub rust_log: String,

    // Sub-configurations
    pub rabbitmq: RabbitMqConfig,
    pub retry: RetryConfig,
    pub store: StoreConfig,
    pub redis_key_prefixes: RedisKeyPrefixes,
    pub policy: FraudPolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://redis:6379/0".to_string(),
            bind_host: "0.0.0.0".to_string(),
            health_port: DEFAULT_HEALTH_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            supervisor_restart_secs: DEFAULT_SUPERVISOR_RESTART_SECS,
            rust_log: "info".to_string(),
            rabbitmq: RabbitMqConfig::default(),
            retry: RetryConfig::default(),
            store: StoreConfig::default(),
            redis_key_prefixes: RedisKeyPrefixes::default(),
            policy: FraudPolicyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        let threshold = match std::env::var("FRAUD_THRESHOLD") {
            Ok(raw) => raw
                .parse::<f64>()
                .ok()
                .filter(|t| t.is_finite())
                .with_context(|| format!("FRAUD_THRESHOLD must be a finite number, got {raw:?}"))?,
            Err(_) => DEFAULT_FRAUD_THRESHOLD,
        };

        Ok(Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            bind_host: std::env::var("BIND_HOST").unwrap_or(defaults.bind_host),
            health_port: env_parse("HEALTH_PORT", defaults.health_port),
            metrics_port: env_parse("METRICS_PORT", defaults.metrics_port),
            supervisor_restart_secs: env_parse(
                "FRAUD_SUPERVISOR_RESTART_SECS",
                defaults.supervisor_restart_secs,
            ),
            rust_log: std::env::var("RUST_LOG").unwrap_or(defaults.rust_log),
            rabbitmq: RabbitMqConfig::from_env(),
            retry: RetryConfig::from_env(),
            store: StoreConfig::from_env(),
            redis_key_prefixes: RedisKeyPrefixes::from_env(),
            policy: FraudPolicyConfig { threshold },
        })
    }

    pub fn health_bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.health_port)
    }

    pub fn metrics_bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.metrics_port)
    }
}

/// Reads and parses an env var, falling back to `default` when unset or unparsable
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key = key, value = %raw, "Unparsable config value, using default");
            default
        }),
        Err(_) => default,
    }
}
