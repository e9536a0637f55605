// ============================================================================
// Fraud Worker Data Model
// ============================================================================
//
// Inbound check requests, the verdict fanned out to downstream queues, and
// the audit record persisted per transfer.
//
// Wire format uses camelCase field names (transferId, isFraud, isDelayed),
// matching the producers and consumers of these queues.
//
// ============================================================================

use crate::decision::{Decision, FraudStatus};
use chrono::{DateTime, Utc};
use fraud_error::MalformedMessageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// ISO-8601 UTC with microseconds and a literal `Z`
const VERDICT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Transfer amount as received
///
/// Keeps the original JSON number so an integer input is echoed back as an
/// integer; comparisons use the `f64` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(Number);

impl Amount {
    pub fn value(&self) -> f64 {
        self.0.as_f64().unwrap_or_default()
    }

    pub fn as_number(&self) -> &Number {
        &self.0
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(Number::from(value))
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inbound message on the check queue
#[derive(Debug, Clone, PartialEq)]
pub struct CheckRequest {
    pub transfer_id: String,
    pub amount: Amount,
    pub is_delayed: bool,
}

impl CheckRequest {
    /// Parse and validate a raw delivery body
    ///
    /// # Errors
    /// - body is not a JSON object
    /// - `transferId` missing, not a string, or empty
    /// - `amount` missing or not a number
    /// - `isDelayed` present but not a boolean
    pub fn parse(body: &[u8]) -> Result<Self, MalformedMessageError> {
        let value: Value = serde_json::from_slice(body)?;
        let Value::Object(fields) = value else {
            return Err(MalformedMessageError::InvalidField {
                field: "body",
                reason: "expected a JSON object".to_string(),
            });
        };

        Ok(Self {
            transfer_id: parse_transfer_id(&fields)?,
            amount: parse_amount(&fields)?,
            is_delayed: parse_is_delayed(&fields)?,
        })
    }
}

fn parse_transfer_id(fields: &Map<String, Value>) -> Result<String, MalformedMessageError> {
    match fields.get("transferId") {
        None | Some(Value::Null) => Err(MalformedMessageError::MissingField("transferId")),
        Some(Value::String(id)) if id.trim().is_empty() => {
            Err(MalformedMessageError::InvalidField {
                field: "transferId",
                reason: "must not be empty".to_string(),
            })
        }
        Some(Value::String(id)) => Ok(id.clone()),
        Some(other) => Err(MalformedMessageError::InvalidField {
            field: "transferId",
            reason: format!("expected a string, got {}", json_type_name(other)),
        }),
    }
}

fn parse_amount(fields: &Map<String, Value>) -> Result<Amount, MalformedMessageError> {
    match fields.get("amount") {
        None | Some(Value::Null) => Err(MalformedMessageError::MissingField("amount")),
        Some(Value::Number(n)) if n.as_f64().is_some() => Ok(Amount(n.clone())),
        Some(Value::Number(n)) => Err(MalformedMessageError::InvalidField {
            field: "amount",
            reason: format!("{n} is not representable as a number"),
        }),
        Some(other) => Err(MalformedMessageError::InvalidField {
            field: "amount",
            reason: format!("expected a number, got {}", json_type_name(other)),
        }),
    }
}

fn parse_is_delayed(fields: &Map<String, Value>) -> Result<bool, MalformedMessageError> {
    match fields.get("isDelayed") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(other) => Err(MalformedMessageError::InvalidField {
            field: "isDelayed",
            reason: format!("expected a boolean, got {}", json_type_name(other)),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Fraud decision plus metadata for a single transfer
///
/// Serialized as-is for the result shape and the cached result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub transfer_id: String,
    pub is_fraud: bool,
    pub status: FraudStatus,
    pub amount: Amount,
    pub timestamp: String,
}

impl Verdict {
    pub fn new(request: &CheckRequest, decision: Decision, decided_at: DateTime<Utc>) -> Self {
        Self {
            transfer_id: request.transfer_id.clone(),
            is_fraud: decision.is_fraud,
            status: decision.status,
            amount: request.amount.clone(),
            timestamp: format_verdict_timestamp(decided_at),
        }
    }
}

pub fn format_verdict_timestamp(at: DateTime<Utc>) -> String {
    at.format(VERDICT_TIMESTAMP_FORMAT).to_string()
}

/// Audit record stored under the transaction key
///
/// Written once before the decision (no `isFraud`/`status`) and once after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub transfer_id: String,
    pub amount: Amount,
    /// Unix epoch seconds when processing started
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_fraud: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<FraudStatus>,
}

impl TransactionRecord {
    pub fn pending(request: &CheckRequest, started_at: DateTime<Utc>) -> Self {
        Self {
            transfer_id: request.transfer_id.clone(),
            amount: request.amount.clone(),
            timestamp: epoch_seconds(started_at),
            is_fraud: None,
            status: None,
        }
    }

    pub fn with_decision(&self, decision: Decision) -> Self {
        Self {
            is_fraud: Some(decision.is_fraud),
            status: Some(decision.status),
            ..self.clone()
        }
    }

    pub fn is_decided(&self) -> bool {
        self.is_fraud.is_some()
    }
}

fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Outcome of claiming a transfer id for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupCheck {
    /// First sighting; the dedup marker is now set
    Fresh,
    /// Marker already present; skip all side effects
    Duplicate,
}

/// Result of processing one delivery
///
/// Both variants are acknowledged; errors are returned separately and rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    /// Decided, persisted and fanned out
    Processed {
        verdict: Verdict,
        /// Queues whose publish failed (logged and counted, not retried)
        failed_queues: Vec<String>,
    },
    /// Transfer id already seen
    Skipped { transfer_id: String },
}
