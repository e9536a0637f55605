// ============================================================================
// Broker Connection Manager
// ============================================================================
//
// Owns the publisher's connection/channel pair. The pair is created lazily
// on first use, reused across publishes, and silently rebuilt when either
// half is no longer connected.
//
// On every (re)connect all output queues are declared durable and the
// channel is switched to publisher-confirm mode.
//
// Declaration mismatch (PRECONDITION_FAILED): the broker closes the channel,
// so a fresh channel is opened and the queue is declared passively, which
// accepts whatever definition already exists.
//
// ============================================================================

use crate::broker::backoff::retry_with_backoff;
use crate::utils::mask_url_credentials;
use fraud_config::{RabbitMqConfig, RetryConfig};
use fraud_error::ConnectionError;
use fraud_metrics::BROKER_RECONNECTS;
use lapin::options::{ConfirmSelectOptions, QueueDeclareOptions};
use lapin::protocol::{AMQPErrorKind, AMQPSoftError};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connect to the broker, backing off between failed attempts
pub async fn connect_with_backoff(
    url: &str,
    retry: &RetryConfig,
) -> Result<Connection, ConnectionError> {
    info!(url = %mask_url_credentials(url), "Connecting to RabbitMQ");
    let connection = retry_with_backoff(retry, "amqp_connect", || {
        Connection::connect(url, ConnectionProperties::default())
    })
    .await?;
    info!("Connected to RabbitMQ");
    Ok(connection)
}

/// Declare `queue` durable, falling back to a passive declare on mismatch
///
/// Returns the channel to keep using: the one passed in, or a replacement
/// when the broker closed it over a property mismatch.
pub async fn declare_durable_queue(
    connection: &Connection,
    channel: Channel,
    queue: &str,
    arguments: FieldTable,
) -> Result<Channel, lapin::Error> {
    let options = QueueDeclareOptions {
        durable: true,
        ..Default::default()
    };

    match channel.queue_declare(queue, options, arguments).await {
        Ok(_) => {
            debug!(queue = %queue, "Declared durable queue");
            Ok(channel)
        }
        Err(e) if is_precondition_failed(&e) => {
            warn!(
                queue = %queue,
                error = %e,
                "Queue exists with different properties, using existing definition"
            );
            let channel = connection.create_channel().await?;
            let passive = QueueDeclareOptions {
                passive: true,
                ..Default::default()
            };
            channel
                .queue_declare(queue, passive, FieldTable::default())
                .await?;
            Ok(channel)
        }
        Err(e) => Err(e),
    }
}

fn is_precondition_failed(error: &lapin::Error) -> bool {
    match error {
        lapin::Error::ProtocolError(amqp_error) => matches!(
            amqp_error.kind(),
            AMQPErrorKind::Soft(AMQPSoftError::PRECONDITIONFAILED)
        ),
        _ => false,
    }
}

struct ChannelPair {
    connection: Connection,
    channel: Channel,
}

impl ChannelPair {
    fn is_usable(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }

    async fn close(self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(200, "Bye").await {
                warn!(error = %e, "Failed to close publisher channel");
            }
        }
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(200, "Bye").await {
                warn!(error = %e, "Failed to close publisher connection");
            }
        }
    }
}

/// Lazily connected, self-healing publisher channel
pub struct BrokerConnectionManager {
    url: String,
    retry: RetryConfig,
    output_queues: Vec<String>,
    state: Mutex<Option<ChannelPair>>,
}

impl BrokerConnectionManager {
    pub fn new(config: &RabbitMqConfig, retry: RetryConfig) -> Self {
        Self {
            url: config.url.clone(),
            retry,
            output_queues: config.output_queues(),
            state: Mutex::new(None),
        }
    }

    /// Get a connected, confirm-mode channel with all output queues declared
    ///
    /// # Errors
    /// `ConnectionError` once the connect retry budget is exhausted or a
    /// declaration fails for a reason other than a property mismatch.
    pub async fn acquire_channel(&self) -> Result<Channel, ConnectionError> {
        let mut state = self.state.lock().await;

        if let Some(pair) = state.as_ref() {
            if pair.is_usable() {
                return Ok(pair.channel.clone());
            }
            warn!("Publisher connection lost, reconnecting");
        }
        if let Some(stale) = state.take() {
            stale.close().await;
        }

        let pair = self.open().await?;
        let channel = pair.channel.clone();
        *state = Some(pair);
        BROKER_RECONNECTS.inc();

        Ok(channel)
    }

    async fn open(&self) -> Result<ChannelPair, ConnectionError> {
        let connection = connect_with_backoff(&self.url, &self.retry).await?;
        let mut channel = connection.create_channel().await?;

        for queue in &self.output_queues {
            channel =
                declare_durable_queue(&connection, channel, queue, FieldTable::default()).await?;
        }
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        info!(
            queues = ?self.output_queues,
            "Publisher channel ready (confirm mode)"
        );
        Ok(ChannelPair {
            connection,
            channel,
        })
    }

    /// True when a cached pair exists and both halves are connected
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(ChannelPair::is_usable)
    }

    /// Close the cached channel and connection, if any
    pub async fn close(&self) {
        if let Some(pair) = self.state.lock().await.take() {
            pair.close().await;
            info!("Publisher connection closed");
        }
    }

    /// One-shot connectivity check on a throwaway connection
    pub async fn probe(url: &str) -> Result<(), ConnectionError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        connection.close(200, "Health probe").await?;
        Ok(())
    }
}
