// Re-export types from modular crates
pub use fraud_config::Config;
pub use fraud_error::{
    ConnectionError, MalformedMessageError, PublishError, StoreError, WorkerError, WorkerResult,
};

pub mod broker;
pub mod decision;
pub mod fraud_worker;
pub mod health;
pub mod utils;
