// ============================================================================
// Test Utilities for the Fraud Worker
// ============================================================================
//
// In-memory doubles for the pipeline's I/O seams:
// - InMemoryAuditStore: Redis-like key/value store with TTLs on a manual clock
// - RecordingPublisher: captures publishes, can fail or stall per queue,
//   refuse a channel up front or lose it mid fan-out
//
// ============================================================================

#![allow(dead_code)]

use async_trait::async_trait;
use fraud_config::{RabbitMqConfig, RedisKeyPrefixes, StoreConfig};
use fraud_error::{ConnectionError, PublishError, StoreError};
use fraud_screening_shared::broker::ResultPublisher;
use fraud_screening_shared::decision::ThresholdPolicy;
use fraud_screening_shared::fraud_worker::{
    AuditStore, DedupCheck, FraudCheckProcessor, RoutingTable, TransactionRecord, Verdict,
    DEDUP_MARKER,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Clock
// ============================================================================

/// Seconds since an arbitrary epoch; only moves when told to
#[derive(Default)]
pub struct ManualClock {
    now_secs: AtomicU64,
}

impl ManualClock {
    pub fn now(&self) -> u64 {
        self.now_secs.load(Ordering::SeqCst)
    }

    pub fn advance(&self, by: Duration) {
        self.now_secs.fetch_add(by.as_secs(), Ordering::SeqCst);
    }
}

// ============================================================================
// In-memory store
// ============================================================================

struct Entry {
    value: String,
    expires_at: u64,
}

pub struct InMemoryAuditStore {
    clock: Arc<ManualClock>,
    prefixes: RedisKeyPrefixes,
    config: StoreConfig,
    entries: Mutex<HashMap<String, Entry>>,
    writes: AtomicUsize,
    failing: Mutex<HashSet<&'static str>>,
}

impl InMemoryAuditStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            prefixes: RedisKeyPrefixes::default(),
            config: StoreConfig::default(),
            entries: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every call to `operation` fail with a timeout
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Number of successful writes of any kind
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Live (unexpired) keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Remaining TTL in seconds, None if absent or expired
    pub fn ttl(&self, key: &str) -> Option<u64> {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now)
    }

    fn check(&self, operation: &'static str) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().contains(operation) {
            return Err(StoreError::Timeout {
                operation: operation.to_string(),
                timeout: self.config.op_timeout(),
            });
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        self.entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }

    fn set(&self, key: String, value: String, ttl_secs: u64) {
        let expires_at = self.clock.now() + ttl_secs;
        self.entries
            .lock()
            .unwrap()
            .insert(key, Entry { value, expires_at });
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: String) -> Result<Option<T>, StoreError> {
        self.get(&key)
            .map(|json| {
                serde_json::from_str(&json).map_err(|source| StoreError::Corrupt { key, source })
            })
            .transpose()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn is_duplicate(&self, transfer_id: &str) -> Result<bool, StoreError> {
        self.check("is_duplicate")?;
        Ok(self.get(&self.prefixes.dedup_key(transfer_id)).is_some())
    }

    async fn mark_processing(&self, transfer_id: &str) -> Result<(), StoreError> {
        self.check("mark_processing")?;
        self.set(
            self.prefixes.dedup_key(transfer_id),
            DEDUP_MARKER.to_string(),
            self.config.dedup_ttl_secs,
        );
        Ok(())
    }

    async fn claim(&self, transfer_id: &str) -> Result<DedupCheck, StoreError> {
        self.check("claim")?;
        let key = self.prefixes.dedup_key(transfer_id);
        if self.get(&key).is_some() {
            return Ok(DedupCheck::Duplicate);
        }
        self.set(key, DEDUP_MARKER.to_string(), self.config.dedup_ttl_secs);
        Ok(DedupCheck::Fresh)
    }

    async fn record_transaction(
        &self,
        transfer_id: &str,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        self.check("record_transaction")?;
        let json = serde_json::to_string(record).unwrap();
        self.set(
            self.prefixes.transaction_key(transfer_id),
            json,
            self.config.transaction_ttl_secs,
        );
        Ok(())
    }

    async fn cache_result(&self, transfer_id: &str, verdict: &Verdict) -> Result<(), StoreError> {
        self.check("cache_result")?;
        let json = serde_json::to_string(verdict).unwrap();
        self.set(
            self.prefixes.result_key(transfer_id),
            json,
            self.config.result_ttl_secs,
        );
        Ok(())
    }

    async fn cached_result(&self, transfer_id: &str) -> Result<Option<Verdict>, StoreError> {
        self.check("cached_result")?;
        self.get_json(self.prefixes.result_key(transfer_id))
    }

    async fn transaction(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        self.check("transaction")?;
        self.get_json(self.prefixes.transaction_key(transfer_id))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check("ping")
    }
}

// ============================================================================
// Recording publisher
// ============================================================================

#[derive(Debug, Clone)]
pub struct Published {
    pub queue: String,
    pub payload: Value,
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Published>>,
    failing_queues: Mutex<HashSet<String>>,
    stalled_queues: Mutex<HashSet<String>>,
    channel_down: AtomicBool,
    channel_lost: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub fn fail_queue(&self, queue: &str) {
        self.failing_queues.lock().unwrap().insert(queue.to_string());
    }

    /// Publishes to `queue` never complete
    pub fn stall_queue(&self, queue: &str) {
        self.stalled_queues.lock().unwrap().insert(queue.to_string());
    }

    /// Hand out a channel, then fail every publish as if it had closed
    pub fn lose_channel(&self) {
        self.channel_lost.store(true, Ordering::SeqCst);
    }

    /// Number of publish calls, successful or not
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Simulate a broker that cannot hand out a channel
    pub fn set_channel_down(&self, down: bool) {
        self.channel_down.store(down, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn queues(&self) -> Vec<String> {
        self.published().into_iter().map(|p| p.queue).collect()
    }

    pub fn to_queue(&self, queue: &str) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|p| p.queue == queue)
            .map(|p| p.payload)
            .collect()
    }
}

#[async_trait]
impl ResultPublisher for RecordingPublisher {
    async fn ready(&self) -> Result<(), ConnectionError> {
        if self.channel_down.load(Ordering::SeqCst) {
            return Err(ConnectionError::RetriesExhausted {
                operation: "amqp_connect".to_string(),
                attempts: 1,
                last_error: "connection refused".to_string(),
            });
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.channel_lost.load(Ordering::SeqCst) {
            return Err(PublishError::Channel {
                queue: queue.to_string(),
                source: ConnectionError::RetriesExhausted {
                    operation: "amqp_connect".to_string(),
                    attempts: 1,
                    last_error: "channel closed".to_string(),
                },
            });
        }
        if self.stalled_queues.lock().unwrap().contains(queue) {
            std::future::pending::<()>().await;
        }
        if self.failing_queues.lock().unwrap().contains(queue) {
            return Err(PublishError::Nacked {
                queue: queue.to_string(),
            });
        }
        let payload: Value = serde_json::from_slice(payload).unwrap();
        self.published.lock().unwrap().push(Published {
            queue: queue.to_string(),
            payload,
        });
        Ok(())
    }
}

// ============================================================================
// Pipeline harness
// ============================================================================

pub struct TestPipeline {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryAuditStore>,
    pub publisher: Arc<RecordingPublisher>,
    pub processor: FraudCheckProcessor,
}

pub fn spawn_pipeline() -> TestPipeline {
    spawn_pipeline_with(RabbitMqConfig::default())
}

pub fn spawn_pipeline_with(rabbitmq: RabbitMqConfig) -> TestPipeline {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryAuditStore::new(clock.clone()));
    let publisher = Arc::new(RecordingPublisher::default());
    let processor = FraudCheckProcessor::new(
        store.clone(),
        Arc::new(ThresholdPolicy::default()),
        publisher.clone(),
        RoutingTable::from_config(&rabbitmq),
    );

    TestPipeline {
        clock,
        store,
        publisher,
        processor,
    }
}

pub fn check_request(transfer_id: &str, amount: Value, is_delayed: bool) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "transferId": transfer_id,
        "amount": amount,
        "isDelayed": is_delayed,
    }))
    .unwrap()
}
