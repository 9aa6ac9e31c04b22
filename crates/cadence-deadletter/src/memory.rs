//! In-memory transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{DeadLetterError, Result};
use crate::record::{ConsumerRecord, Header, ProducerRecord};
use crate::transport::{RecordSink, RecordSource};

#[derive(Debug, Default)]
struct SourceState {
    records: VecDeque<ConsumerRecord>,
    next_offset: i64,
    committed: Option<i64>,
}

/// Single-partition in-memory topic.
///
/// `poll` keeps returning the oldest uncommitted record until it is
/// committed.
pub struct MemoryRecordSource {
    topic: String,
    state: Mutex<SourceState>,
    notify: Notify,
}

impl MemoryRecordSource {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            state: Mutex::new(SourceState::default()),
            notify: Notify::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Append a record and return its offset.
    pub fn push(&self, key: Option<Vec<u8>>, value: Vec<u8>) -> i64 {
        self.push_with_headers(key, value, Vec::new())
    }

    pub fn push_with_headers(
        &self,
        key: Option<Vec<u8>>,
        value: Vec<u8>,
        headers: Vec<Header>,
    ) -> i64 {
        let offset = {
            let mut state = self.state.lock();
            let offset = state.next_offset;
            state.next_offset += 1;
            state.records.push_back(ConsumerRecord {
                topic: self.topic.clone(),
                partition: 0,
                offset,
                timestamp: Utc::now().timestamp_millis(),
                key,
                value,
                headers,
            });
            offset
        };
        debug!("Appended record {}-0@{}", self.topic, offset);
        self.notify.notify_one();
        offset
    }

    /// Records not yet committed.
    pub fn pending(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn committed_offset(&self) -> Option<i64> {
        self.state.lock().committed
    }

    fn peek(&self) -> Option<ConsumerRecord> {
        self.state.lock().records.front().cloned()
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumerRecord>> {
        if let Some(record) = self.peek() {
            return Ok(Some(record));
        }
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
        Ok(self.peek())
    }

    async fn commit(&self, record: &ConsumerRecord) -> Result<()> {
        let mut state = self.state.lock();
        if record.topic != self.topic {
            return Err(DeadLetterError::Transport(format!(
                "cannot commit {} on topic {}",
                record, self.topic
            )));
        }
        while state
            .records
            .front()
            .is_some_and(|front| front.offset <= record.offset)
        {
            state.records.pop_front();
        }
        state.committed = Some(state.committed.map_or(record.offset, |c| c.max(record.offset)));
        Ok(())
    }
}

/// Sink that keeps every record it was sent.
#[derive(Default)]
pub struct MemoryRecordSink {
    sent: Mutex<Vec<ProducerRecord>>,
    failing: AtomicBool,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ProducerRecord> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn send(&self, record: ProducerRecord) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DeadLetterError::Transport(format!(
                "sink unavailable for topic {}",
                record.topic
            )));
        }
        self.sent.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poll_redelivers_until_commit() {
        let source = MemoryRecordSource::new("orders");
        assert_eq!(source.push(None, b"a".to_vec()), 0);
        assert_eq!(source.push(None, b"b".to_vec()), 1);

        let first = source.poll(Duration::ZERO).await.unwrap().unwrap();
        let again = source.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.offset, 0);
        assert_eq!(again.offset, 0);

        source.commit(&first).await.unwrap();
        let second = source.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert_eq!(source.committed_offset(), Some(0));
        assert_eq!(source.pending(), 1);
    }

    #[tokio::test]
    async fn test_poll_times_out_when_empty() {
        let source = MemoryRecordSource::new("orders");
        let polled = source.poll(Duration::from_millis(10)).await.unwrap();
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn test_poll_wakes_on_push() {
        let source = std::sync::Arc::new(MemoryRecordSource::new("orders"));
        let pusher = source.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            pusher.push(Some(b"k".to_vec()), b"v".to_vec());
        });

        let record = source.poll(Duration::from_secs(5)).await.unwrap().unwrap();
        assert_eq!(record.key.as_deref(), Some(b"k".as_slice()));
    }

    #[tokio::test]
    async fn test_commit_rejects_foreign_topic() {
        let source = MemoryRecordSource::new("orders");
        source.push(None, Vec::new());
        let mut record = source.poll(Duration::ZERO).await.unwrap().unwrap();
        record.topic = "payments".to_string();
        assert!(matches!(
            source.commit(&record).await,
            Err(DeadLetterError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_sink_failure_toggle() {
        let sink = MemoryRecordSink::new();
        let record = ProducerRecord {
            topic: "dlq".to_string(),
            partition: None,
            key: None,
            value: Vec::new(),
            headers: Vec::new(),
        };
        sink.set_failing(true);
        assert!(sink.send(record.clone()).await.is_err());
        sink.set_failing(false);
        sink.send(record).await.unwrap();
        assert_eq!(sink.sent().len(), 1);
    }
}
