//! Event pipeline: records published by jobs are consumed with retries,
//! and the ones that keep failing are logged as dead letters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use cadence_config::DeadLetterConfig;
use cadence_deadletter::{
    ConsumerRecord, DeadLetterRecoverer, HandlerError, MemoryRecordSource, ProducerRecord,
    RecordHandler, RecordSink, Result, RetryPolicy, RetryingConsumer,
};

/// Topic the built-in `publish` job writes to.
pub(crate) const EVENTS_TOPIC: &str = "cadence-events";

/// Accepts JSON records.
///
/// Undecodable values are serialization errors. Objects carrying
/// `"fail": true` fail transiently on every attempt.
pub(crate) struct JsonEventHandler;

#[async_trait]
impl RecordHandler for JsonEventHandler {
    async fn handle(&self, record: &ConsumerRecord) -> std::result::Result<(), HandlerError> {
        let event: serde_json::Value = serde_json::from_slice(&record.value)
            .map_err(|e| HandlerError::serialization(e.to_string()))?;
        if event.get("fail").and_then(|v| v.as_bool()) == Some(true) {
            return Err(HandlerError::transient("event requested failure"));
        }
        info!("Handled event {}: {}", record, event);
        Ok(())
    }
}

/// Dead-letter sink that writes records to the log.
pub(crate) struct LogRecordSink;

#[async_trait]
impl RecordSink for LogRecordSink {
    async fn send(&self, record: ProducerRecord) -> Result<()> {
        let headers: Vec<String> = record
            .headers
            .iter()
            .map(|h| format!("{}={}", h.key, h.value_str().unwrap_or("<binary>")))
            .collect();
        warn!(
            topic = %record.topic,
            headers = %headers.join(", "),
            "Dead letter: {}",
            String::from_utf8_lossy(&record.value)
        );
        Ok(())
    }
}

pub(crate) fn retry_policy(config: &DeadLetterConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_retries, Duration::from_millis(config.backoff_ms))
}

/// Consumer over `events` that dead-letters through `sink`.
pub(crate) fn event_consumer(
    config: &DeadLetterConfig,
    events: Arc<MemoryRecordSource>,
    sink: Arc<dyn RecordSink>,
) -> RetryingConsumer {
    RetryingConsumer::new(
        events,
        Arc::new(JsonEventHandler),
        DeadLetterRecoverer::new(sink, config.topic.as_str()),
        retry_policy(config),
    )
    .with_poll_timeout(Duration::from_millis(config.poll_timeout_ms))
}
