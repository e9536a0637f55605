// ============================================================================
// Broker (RabbitMQ / AMQP 0-9-1)
// ============================================================================
//
// - backoff: retry combinator and jittered delay schedule
// - connection: connect, cached publisher channel, queue declaration
// - publisher: persistent, confirmed publishes to output queues
//
// ============================================================================

pub mod backoff;
pub mod connection;
pub mod publisher;

pub use backoff::{retry_with_backoff, BackoffSchedule};
pub use connection::{connect_with_backoff, declare_durable_queue, BrokerConnectionManager};
pub use publisher::{AmqpResultPublisher, ResultPublisher};
