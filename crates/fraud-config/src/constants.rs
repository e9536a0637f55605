// ============================================================================
// Configuration Constants
// ============================================================================

// Default port values
pub(crate) const DEFAULT_HEALTH_PORT: u16 = 8000;
pub(crate) const DEFAULT_METRICS_PORT: u16 = 8001;

// Default TTL values
pub(crate) const DEFAULT_DEDUP_TTL_DAYS: u64 = 7;
pub(crate) const DEFAULT_TRANSACTION_TTL_DAYS: u64 = 7;
pub(crate) const DEFAULT_RESULT_TTL_SECS: u64 = SECONDS_PER_HOUR;

// Broker connect retry (exponential backoff + jitter)
pub(crate) const DEFAULT_RETRY_INITIAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_RETRY_MAX_MS: u64 = 30_000;
pub(crate) const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 30;
pub(crate) const DEFAULT_RETRY_JITTER_RATIO: f64 = 0.5;

// Redis call envelope
pub(crate) const DEFAULT_STORE_OP_TIMEOUT_MS: u64 = 2_000;
pub(crate) const DEFAULT_STORE_OP_MAX_ATTEMPTS: u32 = 3;
pub(crate) const DEFAULT_STORE_OP_INITIAL_BACKOFF_MS: u64 = 100;

// Upper bound on one publish including its broker confirm
pub(crate) const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5_000;

// Outer consume-loop restart delay
pub(crate) const DEFAULT_SUPERVISOR_RESTART_SECS: u64 = 5;

// Amounts strictly above this are declined
pub(crate) const DEFAULT_FRAUD_THRESHOLD: f64 = 1000.0;

// Time conversion constants
pub const SECONDS_PER_HOUR: u64 = 3600;
pub const SECONDS_PER_DAY: u64 = 86400;
