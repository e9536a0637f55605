use std::time::Duration;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Broker unreachable or the connect retry budget ran out
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("AMQP error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Consumer on '{queue}' was cancelled by the broker")]
    ConsumerCancelled { queue: String },
}

/// Inbound payload could not be turned into a check request
#[derive(Error, Debug)]
pub enum MalformedMessageError {
    #[error("Invalid JSON body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A single queue publish failed; never fails the whole message
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Publish to '{queue}' failed: {source}")]
    Broker {
        queue: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Broker negatively acknowledged publish to '{queue}'")]
    Nacked { queue: String },

    #[error("Failed to serialize payload for '{queue}': {source}")]
    Serialize {
        queue: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("No channel available for '{queue}': {source}")]
    Channel {
        queue: String,
        #[source]
        source: ConnectionError,
    },

    #[error("Publish to '{queue}' not confirmed within {timeout:?}")]
    Timeout { queue: String, timeout: Duration },
}

impl PublishError {
    pub fn queue(&self) -> &str {
        match self {
            PublishError::Broker { queue, .. }
            | PublishError::Nacked { queue }
            | PublishError::Serialize { queue, .. }
            | PublishError::Channel { queue, .. }
            | PublishError::Timeout { queue, .. } => queue,
        }
    }
}

/// Dedup/audit store unavailable or returned unusable data
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        operation: String,
        timeout: Duration,
    },

    #[error("Redis operation '{operation}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("Corrupt record at '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record for '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Message-level failure; any of these rejects the delivery without requeue
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] MalformedMessageError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl WorkerError {
    /// Payload itself is bad; redelivery would fail the same way
    pub fn is_poison(&self) -> bool {
        matches!(self, WorkerError::Malformed(_))
    }

    /// Get error code for logs and dead-letter inspection
    pub fn error_code(&self) -> &'static str {
        match self {
            WorkerError::Malformed(_) => "MALFORMED_MESSAGE",
            WorkerError::Store(_) => "STORE_ERROR",
            WorkerError::Connection(_) => "CONNECTION_ERROR",
        }
    }

    /// Log this error with appropriate level and context
    pub fn log(&self, delivery_tag: u64) {
        if self.is_poison() {
            tracing::warn!(
                error = %self,
                error_code = self.error_code(),
                delivery_tag = delivery_tag,
                "Rejecting malformed message"
            );
        } else {
            tracing::error!(
                error = %self,
                error_code = self.error_code(),
                delivery_tag = delivery_tag,
                "Error processing message"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let malformed = WorkerError::from(MalformedMessageError::MissingField("amount"));
        assert!(malformed.is_poison());
        assert_eq!(malformed.error_code(), "MALFORMED_MESSAGE");
        assert_eq!(
            malformed.to_string(),
            "Malformed message: Missing required field 'amount'"
        );

        let store = WorkerError::from(StoreError::Timeout {
            operation: "claim".to_string(),
            timeout: Duration::from_secs(2),
        });
        assert!(!store.is_poison());
        assert_eq!(store.error_code(), "STORE_ERROR");
    }

    #[test]
    fn test_publish_error_queue() {
        let err = PublishError::Nacked {
            queue: "FraudEvents".to_string(),
        };
        assert_eq!(err.queue(), "FraudEvents");
    }
}
