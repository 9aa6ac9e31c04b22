//! Dead-letter recoverer.

use std::sync::Arc;

use tracing::error;

use crate::error::{DeadLetterError, HandlerError, Result};
use crate::record::{
    ConsumerRecord, Header, ORIGIN_ERROR_MSG, ORIGIN_OFFSET, ORIGIN_PARTITION, ORIGIN_TIMESTAMP,
    ORIGIN_TOPIC, ProducerRecord,
};
use crate::transport::RecordSink;

/// Default dead-letter topic.
pub const DEFAULT_DEAD_LETTER_TOPIC: &str = "dead-letter-queue";

/// Republishes records that exhausted their attempts to a dead-letter topic.
pub struct DeadLetterRecoverer {
    sink: Arc<dyn RecordSink>,
    topic: String,
}

impl DeadLetterRecoverer {
    pub fn new(sink: Arc<dyn RecordSink>, topic: impl Into<String>) -> Self {
        Self {
            sink,
            topic: topic.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The dead-letter form of `record`: same key and value, partition left
    /// to the sink, failure described in text headers.
    pub fn build_record(&self, record: &ConsumerRecord, failure: &HandlerError) -> ProducerRecord {
        ProducerRecord {
            topic: self.topic.clone(),
            partition: None,
            key: record.key.clone(),
            value: record.value.clone(),
            headers: vec![
                Header::text(ORIGIN_ERROR_MSG, failure.message.clone()),
                Header::text(ORIGIN_TOPIC, record.topic.clone()),
                Header::text(ORIGIN_PARTITION, record.partition.to_string()),
                Header::text(ORIGIN_OFFSET, record.offset.to_string()),
                Header::text(ORIGIN_TIMESTAMP, record.timestamp.to_string()),
            ],
        }
    }

    /// Publish the dead-letter form of `record`.
    pub async fn recover(&self, record: &ConsumerRecord, failure: &HandlerError) -> Result<()> {
        let dead_letter = self.build_record(record, failure);
        if let Err(e) = self.sink.send(dead_letter).await {
            error!(
                "Failed to write {} to dead-letter topic {}: {} (value: {})",
                record,
                self.topic,
                e,
                record.value_lossy()
            );
            return Err(DeadLetterError::DeadLetterWrite {
                topic: record.topic.clone(),
                partition: record.partition,
                offset: record.offset,
                message: e.to_string(),
            });
        }
        error!(
            "Sent failed record {} to dead-letter topic {}: {}",
            record,
            self.topic,
            record.value_lossy()
        );
        Ok(())
    }
}
