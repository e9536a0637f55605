// ============================================================================
// Fraud Worker Module
// ============================================================================
//
// Consumes transfer-check requests, deduplicates them by transfer id,
// decides, persists an audit trail and fans the verdict out to downstream
// queues.
//
// ============================================================================

pub mod consumer;
pub mod processor;
pub mod retry;
pub mod router;
pub mod store;
pub mod types;

pub use consumer::{run_supervised, FraudCheckConsumer};
pub use processor::FraudCheckProcessor;
pub use retry::execute_with_retry;
pub use router::{PayloadShape, Route, RouteCondition, RoutedMessage, RoutingTable};
pub use store::{AuditStore, RedisAuditStore, DEDUP_MARKER};
pub use types::{Amount, CheckRequest, DedupCheck, ProcessResult, TransactionRecord, Verdict};
