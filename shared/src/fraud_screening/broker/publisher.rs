// ============================================================================
// Result Publisher
// ============================================================================
//
// Publishes rendered verdicts to output queues on the default exchange.
// Messages are persistent (delivery_mode = 2) and each publish waits for the
// broker's confirm; a nack is reported as a failure for that queue only.
//
// ============================================================================

use crate::broker::connection::BrokerConnectionManager;
use async_trait::async_trait;
use fraud_error::{ConnectionError, PublishError};
use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use serde_json::Value;
use std::sync::Arc;

const PERSISTENT_DELIVERY_MODE: u8 = 2;

/// Sink for fanned-out verdicts
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    /// Make sure a usable channel exists before a batch of publishes
    async fn ready(&self) -> Result<(), ConnectionError>;

    /// Publish raw bytes to `queue`
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), PublishError>;

    /// Serialize `payload` as JSON and publish it
    async fn publish_json(&self, queue: &str, payload: &Value) -> Result<(), PublishError> {
        let body = serde_json::to_vec(payload).map_err(|source| PublishError::Serialize {
            queue: queue.to_string(),
            source,
        })?;
        self.publish(queue, &body).await
    }
}

/// AMQP publisher over the shared connection manager
#[derive(Clone)]
pub struct AmqpResultPublisher {
    connections: Arc<BrokerConnectionManager>,
}

impl AmqpResultPublisher {
    pub fn new(connections: Arc<BrokerConnectionManager>) -> Self {
        Self { connections }
    }

    fn properties() -> BasicProperties {
        BasicProperties::default()
            .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
            .with_content_type("application/json".into())
    }
}

#[async_trait]
impl ResultPublisher for AmqpResultPublisher {
    async fn ready(&self) -> Result<(), ConnectionError> {
        self.connections.acquire_channel().await.map(|_| ())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), PublishError> {
        let channel = self
            .connections
            .acquire_channel()
            .await
            .map_err(|source| PublishError::Channel {
                queue: queue.to_string(),
                source,
            })?;

        let broker_error = |source| PublishError::Broker {
            queue: queue.to_string(),
            source,
        };

        let confirmation = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                payload,
                Self::properties(),
            )
            .await
            .map_err(broker_error)?
            .await
            .map_err(broker_error)?;

        if confirmation.is_nack() {
            return Err(PublishError::Nacked {
                queue: queue.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_persistent_json() {
        let properties = AmqpResultPublisher::properties();
        assert_eq!(properties.delivery_mode(), &Some(PERSISTENT_DELIVERY_MODE));
        assert_eq!(
            properties.content_type().as_ref().map(|c| c.as_str()),
            Some("application/json")
        );
    }
}
