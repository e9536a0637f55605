// ============================================================================
// Deduplication & Audit Store
// ============================================================================
//
// Three record kinds per transfer, each under its own key prefix:
//
//   dedup:{transferId}   "processed:<nonce>" marker    TTL 7 days
//   txn:{transferId}     TransactionRecord (JSON)      TTL 7 days
//   result:{transferId}  Verdict (JSON)                TTL 1 hour
//
// Writes are upserts that refresh the TTL. The dedup marker is claimed
// atomically (SET NX EX) so two workers racing on the same transfer id
// cannot both see it as fresh.
//
// Each claim writes its own token ("processed:<nonce>"). SET NX is not
// idempotent: if an attempt lands but its reply times out, the retry sees
// the key already set. Reading the key back and finding our own token
// means the claim is still ours.
//
// ============================================================================

use crate::fraud_worker::retry::execute_with_retry;
use crate::fraud_worker::types::{DedupCheck, TransactionRecord, Verdict};
use async_trait::async_trait;
use fraud_config::{RedisKeyPrefixes, StoreConfig};
use fraud_error::StoreError;
use fraud_redis::RedisClient;
use redis::RedisResult;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Value stored under every dedup key (claims append a nonce)
pub const DEDUP_MARKER: &str = "processed";

fn claim_token() -> String {
    format!("{}:{:016x}", DEDUP_MARKER, rand::random::<u64>())
}

/// The two commands a dedup claim needs
#[async_trait]
pub(crate) trait MarkerBackend: Sync {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<bool>;
    async fn get(&self, key: &str) -> RedisResult<Option<String>>;
}

#[async_trait]
impl MarkerBackend for RedisClient {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64) -> RedisResult<bool> {
        RedisClient::set_nx_ex(self, key, value, ttl_secs).await
    }

    async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        RedisClient::get(self, key).await
    }
}

/// Claim `key` with `token`, safe to retry
///
/// An attempt that finds the key already set reads it back; only a foreign
/// token counts as a duplicate.
pub(crate) async fn claim_with_token<B: MarkerBackend>(
    backend: &B,
    config: &StoreConfig,
    key: &str,
    token: &str,
) -> Result<DedupCheck, StoreError> {
    let ttl = config.dedup_ttl_secs;

    execute_with_retry(config, "claim_transfer", move || async move {
        if backend.set_nx_ex(key, token, ttl).await? {
            return Ok(DedupCheck::Fresh);
        }
        let current = backend.get(key).await?;
        Ok::<_, redis::RedisError>(if current.as_deref() == Some(token) {
            DedupCheck::Fresh
        } else {
            DedupCheck::Duplicate
        })
    })
    .await
}

/// Deduplication markers, audit records and cached verdicts
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Check if a dedup marker exists for this transfer
    async fn is_duplicate(&self, transfer_id: &str) -> Result<bool, StoreError>;

    /// Set the dedup marker (overwrites, refreshes TTL)
    async fn mark_processing(&self, transfer_id: &str) -> Result<(), StoreError>;

    /// Check-and-mark in one step
    ///
    /// The default composes `is_duplicate` and `mark_processing` and is only
    /// safe with a single consumer. Implementations backed by a shared store
    /// should override it with an atomic set-if-absent.
    async fn claim(&self, transfer_id: &str) -> Result<DedupCheck, StoreError> {
        if self.is_duplicate(transfer_id).await? {
            return Ok(DedupCheck::Duplicate);
        }
        self.mark_processing(transfer_id).await?;
        Ok(DedupCheck::Fresh)
    }

    async fn record_transaction(
        &self,
        transfer_id: &str,
        record: &TransactionRecord,
    ) -> Result<(), StoreError>;

    async fn cache_result(&self, transfer_id: &str, verdict: &Verdict) -> Result<(), StoreError>;

    async fn cached_result(&self, transfer_id: &str) -> Result<Option<Verdict>, StoreError>;

    async fn transaction(&self, transfer_id: &str)
        -> Result<Option<TransactionRecord>, StoreError>;

    /// Liveness probe
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisAuditStore {
    client: RedisClient,
    prefixes: RedisKeyPrefixes,
    config: StoreConfig,
}

impl RedisAuditStore {
    pub fn new(client: RedisClient, prefixes: RedisKeyPrefixes, config: StoreConfig) -> Self {
        Self {
            client,
            prefixes,
            config,
        }
    }

    async fn put_json<T: Serialize + Sync>(
        &self,
        operation_name: &str,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let client = &self.client;
        let json = json.as_str();

        execute_with_retry(&self.config, operation_name, move || {
            client.set_ex(key, json, ttl_secs)
        })
        .await
    }

    async fn get_json<T: DeserializeOwned + Send>(
        &self,
        operation_name: &str,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        let client = &self.client;
        let raw: Option<String> =
            execute_with_retry(&self.config, operation_name, move || client.get(key)).await?;

        raw.map(|json| {
            serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl AuditStore for RedisAuditStore {
    async fn is_duplicate(&self, transfer_id: &str) -> Result<bool, StoreError> {
        let key = self.prefixes.dedup_key(transfer_id);
        let client = &self.client;
        let key = key.as_str();

        execute_with_retry(&self.config, "check_deduplication", move || {
            client.exists(key)
        })
        .await
    }

    async fn mark_processing(&self, transfer_id: &str) -> Result<(), StoreError> {
        let key = self.prefixes.dedup_key(transfer_id);
        let client = &self.client;
        let key = key.as_str();
        let ttl = self.config.dedup_ttl_secs;

        execute_with_retry(&self.config, "mark_processing", move || {
            client.set_ex(key, DEDUP_MARKER, ttl)
        })
        .await
    }

    async fn claim(&self, transfer_id: &str) -> Result<DedupCheck, StoreError> {
        let key = self.prefixes.dedup_key(transfer_id);
        let token = claim_token();

        let check = claim_with_token(&self.client, &self.config, &key, &token).await?;
        debug!(transfer_id = %transfer_id, check = ?check, "Dedup claim");
        Ok(check)
    }

    async fn record_transaction(
        &self,
        transfer_id: &str,
        record: &TransactionRecord,
    ) -> Result<(), StoreError> {
        let key = self.prefixes.transaction_key(transfer_id);
        self.put_json(
            "record_transaction",
            &key,
            record,
            self.config.transaction_ttl_secs,
        )
        .await
    }

    async fn cache_result(&self, transfer_id: &str, verdict: &Verdict) -> Result<(), StoreError> {
        let key = self.prefixes.result_key(transfer_id);
        self.put_json("cache_result", &key, verdict, self.config.result_ttl_secs)
            .await
    }

    async fn cached_result(&self, transfer_id: &str) -> Result<Option<Verdict>, StoreError> {
        let key = self.prefixes.result_key(transfer_id);
        self.get_json("get_cached_result", &key).await
    }

    async fn transaction(
        &self,
        transfer_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let key = self.prefixes.transaction_key(transfer_id);
        self.get_json("get_transaction", &key).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let client = &self.client;
        execute_with_retry(&self.config, "ping", move || client.ping()).await
    }
}
