//! Transport seams to the message broker.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::record::{ConsumerRecord, ProducerRecord};

/// Where records are consumed from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Next record, or `None` if nothing arrived within `timeout`.
    ///
    /// A record that was polled but never committed is returned again.
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumerRecord>>;

    /// Advance the consumer position past `record`.
    async fn commit(&self, record: &ConsumerRecord) -> Result<()>;
}

/// Where records are published to.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn send(&self, record: ProducerRecord) -> Result<()>;
}
