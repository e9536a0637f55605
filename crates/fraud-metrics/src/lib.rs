//! Prometheus metrics for the fraud screening worker
//!
//! Counter names are shared with the existing Prometheus dashboards:
//! - Message processing outcomes
//! - Fraud detections
//! - Duplicate deliveries absorbed by deduplication
//! - Publish and broker connection failures

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

// ============================================================================
// Message Metrics
// ============================================================================

/// Messages that ran through the decision (duplicates excluded)
pub static MESSAGES_PROCESSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "messages_processed",
        "Total number of messages processed"
    ))
    .expect("Failed to register MESSAGES_PROCESSED metric")
});

pub static FRAUD_DETECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "fraud_detections",
        "Number of fraud cases detected"
    ))
    .expect("Failed to register FRAUD_DETECTIONS metric")
});

/// Deliveries rejected without requeue
pub static PROCESSING_ERRORS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "processing_errors",
        "Number of errors during message processing"
    ))
    .expect("Failed to register PROCESSING_ERRORS metric")
});

pub static DUPLICATE_MESSAGES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "duplicate_messages",
        "Number of duplicate messages skipped"
    ))
    .expect("Failed to register DUPLICATE_MESSAGES metric")
});

pub static DUPLICATE_FRAUD_CHECKS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "duplicate_fraud_checks",
        "Number of duplicate fraud check requests"
    ))
    .expect("Failed to register DUPLICATE_FRAUD_CHECKS metric")
});

// ============================================================================
// Broker Metrics
// ============================================================================

/// Failed publishes, by destination queue
pub static PUBLISH_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "fraud_publish_failures_total",
            "Publishes to an output queue that failed"
        ),
        &["queue"]
    )
    .expect("Failed to register PUBLISH_FAILURES metric")
});

/// Publisher connection (re)establishments
pub static BROKER_RECONNECTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "broker_reconnects_total",
        "Number of times the publisher connection was (re)established"
    ))
    .expect("Failed to register BROKER_RECONNECTS metric")
});

// ============================================================================
// Metrics Collection
// ============================================================================

/// Gather all registered metrics and encode as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics() {
        MESSAGES_PROCESSED.inc();
        PUBLISH_FAILURES.with_label_values(&["FraudEvents"]).inc();

        let metrics_text = gather_metrics().unwrap();
        assert!(metrics_text.contains("messages_processed"));
        assert!(metrics_text.contains("fraud_publish_failures_total{queue=\"FraudEvents\"}"));
    }
}
