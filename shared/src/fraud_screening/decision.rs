// ============================================================================
// Fraud Decision Policy
// ============================================================================
//
// Pure, deterministic classification of a transfer amount.
// No I/O and no clock: the same amount always yields the same decision.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome label carried in every verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FraudStatus {
    Approved,
    Declined,
}

impl fmt::Display for FraudStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FraudStatus::Approved => write!(f, "approved"),
            FraudStatus::Declined => write!(f, "declined"),
        }
    }
}

/// Result of applying a policy to an amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub is_fraud: bool,
    pub status: FraudStatus,
}

impl Decision {
    pub fn fraud() -> Self {
        Self {
            is_fraud: true,
            status: FraudStatus::Declined,
        }
    }

    pub fn clean() -> Self {
        Self {
            is_fraud: false,
            status: FraudStatus::Approved,
        }
    }
}

/// Pluggable fraud rule
///
/// Implementations must be pure: `decide` is called once per fresh request
/// and its output is cached and replayed to every downstream consumer.
pub trait FraudPolicy: Send + Sync {
    fn decide(&self, amount: f64) -> Decision;

    /// Short label for logs
    fn name(&self) -> &'static str;
}

/// Flags any amount strictly greater than `threshold`
#[derive(Debug, Clone, Copy)]
pub struct ThresholdPolicy {
    threshold: f64,
}

impl ThresholdPolicy {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::new(fraud_config::FraudPolicyConfig::default().threshold)
    }
}

impl From<&fraud_config::FraudPolicyConfig> for ThresholdPolicy {
    fn from(config: &fraud_config::FraudPolicyConfig) -> Self {
        Self::new(config.threshold)
    }
}

impl FraudPolicy for ThresholdPolicy {
    fn decide(&self, amount: f64) -> Decision {
        if amount > self.threshold {
            Decision::fraud()
        } else {
            Decision::clean()
        }
    }

    fn name(&self) -> &'static str {
        "threshold"
    }
}
