// ============================================================================
// Fraud Check Processor
// ============================================================================
//
// Per-message pipeline. Runs between delivery and acknowledgment:
//
// 1. Parse body into a CheckRequest (malformed -> error, nothing written)
// 2. Claim the transfer id (duplicate -> Skipped, no other side effects)
// 3. Write the pending audit record
// 4. Decide, write the decided audit record, cache the verdict
// 5. Acquire a publisher channel (failure -> error) and fan out; each
//    publish is bounded by a deadline, and losing the channel mid fan-out
//    marks that queue and every remaining one as failed
// 6. Return Processed; the consumer acknowledges
//
// Any error is returned to the consumer, which rejects without requeue.
// A claimed dedup marker is NOT rolled back on later failure: a redelivery
// of the same transfer id is treated as a duplicate.
//
// ============================================================================

use crate::broker::publisher::ResultPublisher;
use crate::decision::FraudPolicy;
use crate::fraud_worker::router::RoutingTable;
use crate::fraud_worker::store::AuditStore;
use crate::fraud_worker::types::{
    CheckRequest, DedupCheck, ProcessResult, TransactionRecord, Verdict,
};
use chrono::Utc;
use fraud_error::{PublishError, WorkerResult};
use fraud_metrics::{
    DUPLICATE_FRAUD_CHECKS, DUPLICATE_MESSAGES, FRAUD_DETECTIONS, MESSAGES_PROCESSED,
    PUBLISH_FAILURES,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deadline for a single publish when none is configured
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FraudCheckProcessor {
    store: Arc<dyn AuditStore>,
    policy: Arc<dyn FraudPolicy>,
    publisher: Arc<dyn ResultPublisher>,
    router: RoutingTable,
    publish_timeout: Duration,
}

impl FraudCheckProcessor {
    pub fn new(
        store: Arc<dyn AuditStore>,
        policy: Arc<dyn FraudPolicy>,
        publisher: Arc<dyn ResultPublisher>,
        router: RoutingTable,
    ) -> Self {
        Self {
            store,
            policy,
            publisher,
            router,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Process a single delivery body
    ///
    /// # Returns
    /// `Processed` or `Skipped` (both to be acknowledged), or a `WorkerError`
    /// (to be rejected without requeue)
    pub async fn process(&self, body: &[u8]) -> WorkerResult<ProcessResult> {
        let request = CheckRequest::parse(body)?;
        let transfer_id = request.transfer_id.as_str();
        let started_at = Utc::now();

        debug!(
            transfer_id = %transfer_id,
            amount = %request.amount,
            is_delayed = request.is_delayed,
            "Processing fraud check"
        );

        if self.store.claim(transfer_id).await? == DedupCheck::Duplicate {
            DUPLICATE_MESSAGES.inc();
            DUPLICATE_FRAUD_CHECKS.inc();
            info!(transfer_id = %transfer_id, "Duplicate fraud check skipped");
            return Ok(ProcessResult::Skipped {
                transfer_id: request.transfer_id,
            });
        }

        let pending = TransactionRecord::pending(&request, started_at);
        self.store.record_transaction(transfer_id, &pending).await?;

        let decision = self.policy.decide(request.amount.value());
        let verdict = Verdict::new(&request, decision, Utc::now());

        self.store
            .record_transaction(transfer_id, &pending.with_decision(decision))
            .await?;
        self.store.cache_result(transfer_id, &verdict).await?;

        MESSAGES_PROCESSED.inc();
        if decision.is_fraud {
            FRAUD_DETECTIONS.inc();
        }

        info!(
            transfer_id = %transfer_id,
            amount = %request.amount,
            is_fraud = decision.is_fraud,
            status = %decision.status,
            policy = self.policy.name(),
            "Fraud check decided"
        );

        let failed_queues = self.fan_out(&verdict, request.is_delayed).await?;

        Ok(ProcessResult::Processed {
            verdict,
            failed_queues,
        })
    }

    /// Publish to every routed queue; individual failures don't abort the rest
    ///
    /// A lost channel does: nothing after it can be delivered, so the
    /// remaining queues are reported failed without another attempt.
    async fn fan_out(&self, verdict: &Verdict, is_delayed: bool) -> WorkerResult<Vec<String>> {
        self.publisher.ready().await?;

        let mut failed_queues = Vec::new();
        let mut messages = self.router.route(verdict, is_delayed).into_iter();
        while let Some(message) = messages.next() {
            let Err(e) = self.publish_with_deadline(&message.queue, &message.payload).await else {
                debug!(
                    transfer_id = %verdict.transfer_id,
                    queue = %message.queue,
                    "Published verdict"
                );
                continue;
            };

            PUBLISH_FAILURES.with_label_values(&[e.queue()]).inc();
            warn!(
                transfer_id = %verdict.transfer_id,
                queue = %message.queue,
                error = %e,
                "Failed to publish verdict"
            );
            failed_queues.push(message.queue);

            if matches!(e, PublishError::Channel { .. }) {
                for skipped in messages.by_ref() {
                    PUBLISH_FAILURES
                        .with_label_values(&[skipped.queue.as_str()])
                        .inc();
                    warn!(
                        transfer_id = %verdict.transfer_id,
                        queue = %skipped.queue,
                        "Publisher channel lost, verdict not published"
                    );
                    failed_queues.push(skipped.queue);
                }
            }
        }
        Ok(failed_queues)
    }

    async fn publish_with_deadline(
        &self,
        queue: &str,
        payload: &serde_json::Value,
    ) -> Result<(), PublishError> {
        tokio::time::timeout(self.publish_timeout, self.publisher.publish_json(queue, payload))
            .await
            .unwrap_or_else(|_| {
                Err(PublishError::Timeout {
                    queue: queue.to_string(),
                    timeout: self.publish_timeout,
                })
            })
    }
}
