// The application logic lives in `fraud_screening`; its modules are
// re-exported at the crate root so binaries import `fraud_screening_shared::broker`, etc.
mod fraud_screening;
pub use fraud_screening::*;
