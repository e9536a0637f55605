// ============================================================================
// Check Queue Consumer
// ============================================================================
//
// One consume cycle = connect, declare topology, consume until shutdown or
// a fatal broker error. The supervisor restarts failed cycles forever.
//
// Acknowledgment:
//   Processed / Skipped   -> ack
//   any WorkerError       -> nack, requeue = false (dead-lettered if enabled)
//
// Shutdown: the in-flight message is finished and acknowledged before the
// consumer is cancelled and the channel and connection are closed.
//
// ============================================================================

use crate::broker::connection::{connect_with_backoff, declare_durable_queue};
use crate::fraud_worker::processor::FraudCheckProcessor;
use crate::fraud_worker::types::ProcessResult;
use fraud_config::{RabbitMqConfig, RetryConfig};
use fraud_error::{ConnectionError, WorkerResult};
use fraud_metrics::PROCESSING_ERRORS;
use futures_util::stream::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{Channel, Connection};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

/// How a processed delivery is settled with the broker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settlement {
    Ack,
    /// Nack without requeue; dead-lettered when the queue has a DLX
    Reject,
}

/// Pick the settlement for a processing outcome, logging and counting errors
fn settle(
    outcome: &WorkerResult<ProcessResult>,
    delivery_tag: u64,
    stats: &mut ConsumeStats,
) -> Settlement {
    match outcome {
        Ok(ProcessResult::Processed { .. }) => {
            stats.processed += 1;
            Settlement::Ack
        }
        Ok(ProcessResult::Skipped { .. }) => {
            stats.skipped += 1;
            Settlement::Ack
        }
        Err(e) => {
            e.log(delivery_tag);
            PROCESSING_ERRORS.inc();
            stats.rejected += 1;
            Settlement::Reject
        }
    }
}

fn reject_options() -> BasicNackOptions {
    BasicNackOptions {
        requeue: false,
        ..Default::default()
    }
}

/// Outcome counts between periodic log lines
#[derive(Debug, Default)]
struct ConsumeStats {
    processed: u64,
    skipped: u64,
    rejected: u64,
}

pub struct FraudCheckConsumer {
    config: RabbitMqConfig,
    retry: RetryConfig,
    processor: Arc<FraudCheckProcessor>,
}

impl FraudCheckConsumer {
    pub fn new(
        config: RabbitMqConfig,
        retry: RetryConfig,
        processor: Arc<FraudCheckProcessor>,
    ) -> Self {
        Self {
            config,
            retry,
            processor,
        }
    }

    /// Run one consume cycle
    ///
    /// Returns `Ok(())` only on shutdown. Connection loss, consumer
    /// cancellation and ack failures end the cycle with an error.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        if *shutdown.borrow() {
            return Ok(());
        }

        let connection = tokio::select! {
            connection = connect_with_backoff(&self.config.url, &self.retry) => connection?,
            _ = shutdown.changed() => return Ok(()),
        };

        let channel = match self.prepare_channel(&connection).await {
            Ok(channel) => channel,
            Err(e) => {
                close_quietly(None, &connection).await;
                return Err(e);
            }
        };

        let mut consumer = channel
            .basic_consume(
                &self.config.input_queue,
                &self.config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %self.config.input_queue,
            prefetch = self.config.prefetch_count,
            "Waiting for fraud check requests"
        );

        let mut stats = ConsumeStats::default();
        let mut last_stats_log = Instant::now();

        let outcome = loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    info!("Shutdown requested, stopping consumer");
                    break Ok(());
                }
                next = consumer.next() => match next {
                    Some(Ok(delivery)) => {
                        if let Err(e) = self.handle_delivery(delivery, &mut stats).await {
                            break Err(e);
                        }
                    }
                    Some(Err(e)) => break Err(ConnectionError::Broker(e)),
                    None => {
                        break Err(ConnectionError::ConsumerCancelled {
                            queue: self.config.input_queue.clone(),
                        })
                    }
                },
            }

            if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                info!(
                    processed = stats.processed,
                    skipped = stats.skipped,
                    rejected = stats.rejected,
                    "Fraud worker stats (last 30s)"
                );
                stats = ConsumeStats::default();
                last_stats_log = Instant::now();
            }
        };

        if outcome.is_ok() && channel.status().connected() {
            if let Err(e) = channel
                .basic_cancel(&self.config.consumer_tag, BasicCancelOptions::default())
                .await
            {
                warn!(error = %e, "Failed to cancel consumer");
            }
        }
        close_quietly(Some(&channel), &connection).await;

        outcome
    }

    /// Open a channel, declare the inbound queue (and its dead-letter queue)
    /// and apply the prefetch limit
    async fn prepare_channel(&self, connection: &Connection) -> Result<Channel, ConnectionError> {
        let mut channel = connection.create_channel().await?;
        let mut arguments = FieldTable::default();

        if self.config.dead_letter_enabled {
            let dlq = self.config.dead_letter_queue.as_str();
            channel = declare_durable_queue(connection, channel, dlq, FieldTable::default()).await?;
            arguments.insert(
                "x-dead-letter-exchange".into(),
                AMQPValue::LongString("".into()),
            );
            arguments.insert(
                "x-dead-letter-routing-key".into(),
                AMQPValue::LongString(dlq.into()),
            );
        }

        channel =
            declare_durable_queue(connection, channel, &self.config.input_queue, arguments).await?;
        channel
            .basic_qos(self.config.prefetch_count, BasicQosOptions::default())
            .await?;

        Ok(channel)
    }

    /// Process one delivery and settle it
    ///
    /// Errors returned here are broker-level (ack/nack failed) and end the cycle.
    async fn handle_delivery(
        &self,
        delivery: Delivery,
        stats: &mut ConsumeStats,
    ) -> Result<(), ConnectionError> {
        let delivery_tag = delivery.delivery_tag;
        let outcome = self.processor.process(&delivery.data).await;

        match settle(&outcome, delivery_tag, stats) {
            Settlement::Ack => {
                delivery.ack(BasicAckOptions::default()).await?;
                debug!(delivery_tag = delivery_tag, "Message acknowledged");
            }
            Settlement::Reject => {
                delivery.nack(reject_options()).await?;
                debug!(delivery_tag = delivery_tag, "Message rejected");
            }
        }
        Ok(())
    }
}

async fn close_quietly(channel: Option<&Channel>, connection: &Connection) {
    if let Some(channel) = channel {
        if channel.status().connected() {
            if let Err(e) = channel.close(200, "Bye").await {
                debug!(error = %e, "Channel close failed");
            }
        }
    }
    if connection.status().connected() {
        if let Err(e) = connection.close(200, "Bye").await {
            debug!(error = %e, "Connection close failed");
        }
    }
}

/// Run consume cycles until shutdown, pausing `restart_delay` after each failure
pub async fn run_supervised(
    consumer: &FraudCheckConsumer,
    mut shutdown: watch::Receiver<bool>,
    restart_delay: Duration,
) {
    loop {
        match consumer.run(shutdown.clone()).await {
            Ok(()) => {
                info!("Consumer stopped");
                return;
            }
            Err(e) => {
                error!(
                    error = %e,
                    restart_in_secs = restart_delay.as_secs(),
                    "Consumer failed, restarting"
                );
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(restart_delay) => {}
            _ = shutdown.changed() => {}
        }
        if *shutdown.borrow() {
            info!("Shutdown requested during restart backoff");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::publisher::ResultPublisher;
    use crate::decision::ThresholdPolicy;
    use crate::fraud_worker::router::RoutingTable;
    use crate::fraud_worker::store::AuditStore;
    use crate::fraud_worker::types::{TransactionRecord, Verdict};
    use async_trait::async_trait;
    use fraud_error::{PublishError, StoreError};
    use serial_test::serial;

    struct NullStore;

    #[async_trait]
    impl AuditStore for NullStore {
        async fn is_duplicate(&self, _: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn mark_processing(&self, _: &str) -> Result<(), StoreError> {
            Ok(())
        }
        async fn record_transaction(&self, _: &str, _: &TransactionRecord) -> Result<(), StoreError> {
            Ok(())
        }
        async fn cache_result(&self, _: &str, _: &Verdict) -> Result<(), StoreError> {
            Ok(())
        }
        async fn cached_result(&self, _: &str) -> Result<Option<Verdict>, StoreError> {
            Ok(None)
        }
        async fn transaction(&self, _: &str) -> Result<Option<TransactionRecord>, StoreError> {
            Ok(None)
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct NullPublisher;

    #[async_trait]
    impl ResultPublisher for NullPublisher {
        async fn ready(&self) -> Result<(), ConnectionError> {
            Ok(())
        }
        async fn publish(&self, _: &str, _: &[u8]) -> Result<(), PublishError> {
            Ok(())
        }
    }

    fn consumer(url: &str, attempts: u32) -> FraudCheckConsumer {
        let config = RabbitMqConfig {
            url: url.to_string(),
            ..RabbitMqConfig::default()
        };
        let processor = FraudCheckProcessor::new(
            Arc::new(NullStore),
            Arc::new(ThresholdPolicy::default()),
            Arc::new(NullPublisher),
            RoutingTable::from_config(&config),
        );
        let retry = RetryConfig {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            max_attempts: attempts,
            jitter_ratio: 0.0,
        };
        FraudCheckConsumer::new(config, retry, Arc::new(processor))
    }

    #[tokio::test]
    async fn test_run_returns_immediately_when_already_shut_down() {
        let (_tx, rx) = watch::channel(true);
        let result = consumer("amqp://127.0.0.1:1/%2f", 1).run(rx).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_fails_when_broker_unreachable() {
        let (_tx, rx) = watch::channel(false);
        let result = consumer("amqp://127.0.0.1:1/%2f", 2).run(rx).await;
        assert!(matches!(
            result,
            Err(ConnectionError::RetriesExhausted { attempts: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_supervisor_exits_on_shutdown_during_backoff() {
        let (tx, rx) = watch::channel(false);
        let consumer = consumer("amqp://127.0.0.1:1/%2f", 1);

        let supervisor = tokio::spawn(async move {
            run_supervised(&consumer, rx, Duration::from_secs(3600)).await;
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), supervisor)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }

    fn processor() -> Arc<FraudCheckProcessor> {
        consumer("amqp://127.0.0.1:1/%2f", 1).processor
    }

    #[tokio::test]
    #[serial]
    async fn test_processed_and_skipped_are_acked() {
        let processor = processor();
        let errors_before = PROCESSING_ERRORS.get();
        let mut stats = ConsumeStats::default();

        let processed = processor
            .process(br#"{"transferId":"t-ack","amount":12,"isDelayed":false}"#)
            .await;
        assert_eq!(settle(&processed, 1, &mut stats), Settlement::Ack);

        let skipped = Ok(ProcessResult::Skipped {
            transfer_id: "t-ack".to_string(),
        });
        assert_eq!(settle(&skipped, 2, &mut stats), Settlement::Ack);

        assert_eq!(stats.processed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.rejected, 0);
        assert_eq!(PROCESSING_ERRORS.get(), errors_before);
    }

    #[tokio::test]
    #[serial]
    async fn test_errors_are_rejected_and_counted() {
        let processor = processor();
        let errors_before = PROCESSING_ERRORS.get();
        let mut stats = ConsumeStats::default();

        let malformed = processor.process(b"not json").await;
        assert!(malformed.is_err());
        assert_eq!(settle(&malformed, 7, &mut stats), Settlement::Reject);

        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.processed + stats.skipped, 0);
        assert_eq!(PROCESSING_ERRORS.get(), errors_before + 1);
    }

    #[test]
    fn test_reject_never_requeues() {
        assert!(!reject_options().requeue);
        assert!(!reject_options().multiple);
    }
}
