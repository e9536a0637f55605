//! Redis client implementation with connection management

use crate::Result;
use redis::aio::ConnectionManager;
use redis::cmd;

/// Redis client with automatic reconnection
///
/// Cloning is cheap; every clone shares the same multiplexed connection.
#[derive(Clone)]
pub struct RedisClient {
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    // ============================================================================
    // Key-Value Operations
    // ============================================================================

    /// GET - Get value by key
    pub async fn get<T: redis::FromRedisValue>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        cmd("GET").arg(key).query_async(&mut conn).await
    }

    /// SET key value EX seconds - Upsert with expiry
    pub async fn set_ex<V>(&self, key: &str, value: V, seconds: u64) -> Result<()>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        let mut conn = self.conn.clone();
        let _: () = cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// SET key value NX EX seconds - Atomic set-if-absent with expiry
    ///
    /// Returns `true` if the key was written, `false` if it already existed.
    pub async fn set_nx_ex<V>(&self, key: &str, value: V, seconds: u64) -> Result<bool>
    where
        V: redis::ToRedisArgs + Send + Sync,
    {
        let mut conn = self.conn.clone();
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// EXISTS - Check if key exists
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let count: i64 = cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    /// DEL - Delete a key, returns number of keys removed
    pub async fn del(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        cmd("DEL").arg(key).query_async(&mut conn).await
    }

    /// TTL - Remaining time to live in seconds (-2 missing, -1 no expiry)
    pub async fn ttl(&self, key: &str) -> Result<i64> {
        let mut conn = self.conn.clone();
        cmd("TTL").arg(key).query_async(&mut conn).await
    }

    /// PING - Liveness probe
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
