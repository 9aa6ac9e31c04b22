//! # Cadence Dead Letter
//!
//! Retry and dead-letter recovery for records pulled from a message broker.
//!
//! ## Features
//!
//! - Fixed-backoff retries with a bounded attempt count
//! - Error classes that skip retries and go straight to dead-letter
//! - Dead-letter records that keep the original key and value and describe
//!   the failure in `ORIGIN_*` headers
//! - Position committed only after processing or a successful dead-letter write
//! - In-memory transport for tests and local runs

pub mod consumer;
pub mod error;
pub mod memory;
pub mod policy;
pub mod record;
pub mod recoverer;
pub mod transport;

pub use consumer::{RecordHandler, RecordOutcome, RetryingConsumer};
pub use error::{DeadLetterError, ErrorClass, HandlerError, Result};
pub use memory::{MemoryRecordSink, MemoryRecordSource};
pub use policy::RetryPolicy;
pub use record::{ConsumerRecord, Header, ProducerRecord};
pub use recoverer::DeadLetterRecoverer;
pub use transport::{RecordSink, RecordSource};
