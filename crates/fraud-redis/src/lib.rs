//! # Fraud Redis
//!
//! Low-level Redis client for the fraud screening worker.
//!
//! - **No business logic**: key names and record shapes belong to callers
//! - Connection management with automatic reconnection (`ConnectionManager`)
//! - Expiring writes, conditional writes, existence checks
//!
//! ## Example
//!
//! ```rust,no_run
//! use fraud_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RedisClient::connect("redis://localhost:6379").await?;
//!
//!     // Claim a key for a week, only if nobody else holds it
//!     let claimed = client.set_nx_ex("dedup:t-1", "processed", 604_800).await?;
//!
//!     let value: Option<String> = client.get("dedup:t-1").await?;
//!     Ok(())
//! }
//! ```

mod client;

pub use client::RedisClient;

// Re-export commonly used types
pub use redis::RedisError;

/// Result type for Redis operations
pub type Result<T> = std::result::Result<T, RedisError>;
