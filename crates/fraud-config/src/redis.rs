// ============================================================================
// Redis Configuration
// ============================================================================

use crate::constants::*;
use crate::env_parse;
use std::time::Duration;

/// Redis key prefixes, one per record kind
#[derive(Clone, Debug)]
pub struct RedisKeyPrefixes {
    /// Dedup marker: "dedup:{transfer_id}"
    pub dedup: String,
    /// Audit record: "txn:{transfer_id}"
    pub transaction: String,
    /// Cached verdict: "result:{transfer_id}"
    pub result: String,
}

impl Default for RedisKeyPrefixes {
    fn default() -> Self {
        Self {
            dedup: "dedup:".to_string(),
            transaction: "txn:".to_string(),
            result: "result:".to_string(),
        }
    }
}

impl RedisKeyPrefixes {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dedup: std::env::var("REDIS_KEY_PREFIX_DEDUP").unwrap_or(defaults.dedup),
            transaction: std::env::var("REDIS_KEY_PREFIX_TRANSACTION")
                .unwrap_or(defaults.transaction),
            result: std::env::var("REDIS_KEY_PREFIX_RESULT").unwrap_or(defaults.result),
        }
    }

    pub fn dedup_key(&self, transfer_id: &str) -> String {
        format!("{}{}", self.dedup, transfer_id)
    }

    pub fn transaction_key(&self, transfer_id: &str) -> String {
        format!("{}{}", self.transaction, transfer_id)
    }

    pub fn result_key(&self, transfer_id: &str) -> String {
        format!("{}{}", self.result, transfer_id)
    }
}

/// TTLs and per-call envelope for the dedup/audit store
#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub dedup_ttl_secs: u64,
    pub transaction_ttl_secs: u64,
    pub result_ttl_secs: u64,
    /// Timeout applied to every Redis round trip
    pub op_timeout_ms: u64,
    /// Attempts per Redis call before surfacing a store error
    pub op_max_attempts: u32,
    pub op_initial_backoff_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dedup_ttl_secs: DEFAULT_DEDUP_TTL_DAYS * SECONDS_PER_DAY,
            transaction_ttl_secs: DEFAULT_TRANSACTION_TTL_DAYS * SECONDS_PER_DAY,
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
            op_timeout_ms: DEFAULT_STORE_OP_TIMEOUT_MS,
            op_max_attempts: DEFAULT_STORE_OP_MAX_ATTEMPTS,
            op_initial_backoff_ms: DEFAULT_STORE_OP_INITIAL_BACKOFF_MS,
        }
    }
}

fn days_to_ttl_secs(days: u64) -> u64 {
    days.saturating_mul(SECONDS_PER_DAY).max(1)
}

impl StoreConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            dedup_ttl_secs: days_to_ttl_secs(env_parse::<u64>(
                "DEDUP_TTL_DAYS",
                DEFAULT_DEDUP_TTL_DAYS,
            )),
            transaction_ttl_secs: days_to_ttl_secs(env_parse::<u64>(
                "TRANSACTION_TTL_DAYS",
                DEFAULT_TRANSACTION_TTL_DAYS,
            )),
            // Redis rejects EX 0
            result_ttl_secs: env_parse("RESULT_TTL_SECS", defaults.result_ttl_secs).max(1),
            op_timeout_ms: env_parse("REDIS_OP_TIMEOUT_MS", defaults.op_timeout_ms),
            op_max_attempts: env_parse("REDIS_OP_MAX_ATTEMPTS", defaults.op_max_attempts).max(1),
            op_initial_backoff_ms: env_parse(
                "REDIS_OP_INITIAL_BACKOFF_MS",
                defaults.op_initial_backoff_ms,
            ),
        }
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_keys_are_namespaced() {
        let prefixes = RedisKeyPrefixes::default();
        assert_eq!(prefixes.dedup_key("t-1"), "dedup:t-1");
        assert_eq!(prefixes.transaction_key("t-1"), "txn:t-1");
        assert_eq!(prefixes.result_key("t-1"), "result:t-1");
    }

    #[test]
    fn test_default_ttls() {
        let store = StoreConfig::default();
        assert_eq!(store.dedup_ttl_secs, 604_800);
        assert_eq!(store.transaction_ttl_secs, 604_800);
        assert_eq!(store.result_ttl_secs, 3_600);
    }

    #[test]
    #[serial_test::serial]
    fn test_ttl_env_values_are_clamped() {
        std::env::set_var("DEDUP_TTL_DAYS", "0");
        std::env::set_var("TRANSACTION_TTL_DAYS", u64::MAX.to_string());
        std::env::set_var("RESULT_TTL_SECS", "0");

        let store = StoreConfig::from_env();

        std::env::remove_var("DEDUP_TTL_DAYS");
        std::env::remove_var("TRANSACTION_TTL_DAYS");
        std::env::remove_var("RESULT_TTL_SECS");

        assert_eq!(store.dedup_ttl_secs, 1);
        assert_eq!(store.transaction_ttl_secs, u64::MAX);
        assert_eq!(store.result_ttl_secs, 1);
    }
}
