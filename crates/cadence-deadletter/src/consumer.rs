//! Retrying consumer.
//!
//! Pulls records from a [`RecordSource`], hands each to a [`RecordHandler`]
//! and retries failures with a fixed backoff. Records that exhaust their
//! attempts, or fail with a non-retryable class, go to the dead-letter
//! topic. The position is committed only after successful processing or a
//! successful dead-letter write.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{HandlerError, Result};
use crate::policy::RetryPolicy;
use crate::record::ConsumerRecord;
use crate::recoverer::DeadLetterRecoverer;
use crate::transport::RecordSource;

/// Business logic applied to each record.
#[async_trait]
pub trait RecordHandler: Send + Sync {
    async fn handle(&self, record: &ConsumerRecord) -> std::result::Result<(), HandlerError>;
}

/// What became of one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    Processed { attempts: u32 },
    DeadLettered { attempts: u32, reason: String },
    /// The dead-letter write failed; the record stays uncommitted.
    DeadLetterFailed { attempts: u32, error: String },
}

impl RecordOutcome {
    pub fn should_commit(&self) -> bool {
        !matches!(self, RecordOutcome::DeadLetterFailed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RecordOutcome::Processed { attempts }
            | RecordOutcome::DeadLettered { attempts, .. }
            | RecordOutcome::DeadLetterFailed { attempts, .. } => *attempts,
        }
    }
}

pub struct RetryingConsumer {
    source: Arc<dyn RecordSource>,
    handler: Arc<dyn RecordHandler>,
    recoverer: DeadLetterRecoverer,
    policy: RetryPolicy,
    poll_timeout: Duration,
}

impl RetryingConsumer {
    pub fn new(
        source: Arc<dyn RecordSource>,
        handler: Arc<dyn RecordHandler>,
        recoverer: DeadLetterRecoverer,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            handler,
            recoverer,
            policy,
            poll_timeout: Duration::from_millis(3000),
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the handler on `record` until it succeeds, fails for good, or
    /// runs out of attempts. Does not commit.
    pub async fn process(&self, record: &ConsumerRecord) -> RecordOutcome {
        let mut attempt = 1;
        loop {
            let failure = match self.handler.handle(record).await {
                Ok(()) => {
                    debug!("Processed {} on attempt {}", record, attempt);
                    return RecordOutcome::Processed { attempts: attempt };
                }
                Err(failure) => failure,
            };

            if !self.policy.is_retryable(&failure) {
                warn!(
                    "Not retrying {}: {} is non-retryable ({})",
                    record, failure.class, failure.message
                );
                return self.recover(record, failure, attempt).await;
            }
            if !self.policy.should_retry(&failure, attempt) {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    record, attempt, failure.message
                );
                return self.recover(record, failure, attempt).await;
            }

            attempt += 1;
            warn!(
                "Retrying record (attempt {}): topic {}, partition {}, offset {}, reason: {}, value: {}",
                attempt,
                record.topic,
                record.partition,
                record.offset,
                failure.message,
                record.value_lossy()
            );
            tokio::time::sleep(self.policy.backoff).await;
        }
    }

    async fn recover(
        &self,
        record: &ConsumerRecord,
        failure: HandlerError,
        attempts: u32,
    ) -> RecordOutcome {
        match self.recoverer.recover(record, &failure).await {
            Ok(()) => RecordOutcome::DeadLettered {
                attempts,
                reason: failure.message,
            },
            Err(e) => RecordOutcome::DeadLetterFailed {
                attempts,
                error: e.to_string(),
            },
        }
    }

    /// Poll one record, process it and commit when the outcome allows.
    /// Returns `None` if nothing arrived within the poll timeout.
    pub async fn poll_once(&self) -> Result<Option<RecordOutcome>> {
        match self.source.poll(self.poll_timeout).await? {
            Some(record) => self.consume(&record).await.map(Some),
            None => Ok(None),
        }
    }

    async fn consume(&self, record: &ConsumerRecord) -> Result<RecordOutcome> {
        let outcome = self.process(record).await;
        if outcome.should_commit() {
            self.source.commit(record).await?;
        }
        Ok(outcome)
    }

    /// Consume until `shutdown` flips to true or its sender is dropped.
    ///
    /// A record being processed is finished before stopping.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Dead-letter consumer started: {} attempts, {:?} backoff, dead-letter topic {}",
            self.policy.max_attempts(),
            self.policy.backoff,
            self.recoverer.topic()
        );

        loop {
            let polled = tokio::select! {
                polled = self.source.poll(self.poll_timeout) => polled,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            };

            let result = match polled {
                Ok(Some(record)) => self.consume(&record).await,
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match result {
                Ok(RecordOutcome::DeadLetterFailed { .. }) => {
                    tokio::time::sleep(self.policy.backoff).await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Dead-letter consumer error: {}", e);
                    tokio::time::sleep(self.policy.backoff).await;
                }
            }
        }

        info!("Dead-letter consumer stopped");
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
