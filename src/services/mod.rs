pub mod batch;
pub mod client;
pub mod idempotency;
pub mod retry;
pub mod signature;
