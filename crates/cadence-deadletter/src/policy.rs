//! Retry policy.

use std::collections::HashSet;
use std::time::Duration;

use crate::error::{ErrorClass, HandlerError};

/// Fixed-backoff retry policy.
///
/// A record is attempted at most `max_retries + 1` times. Failures whose
/// class is non-retryable skip the remaining attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub non_retryable: HashSet<ErrorClass>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_millis(1000),
            non_retryable: HashSet::from([ErrorClass::Serialization]),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
            ..Self::default()
        }
    }

    pub fn with_non_retryable(mut self, class: ErrorClass) -> Self {
        self.non_retryable.insert(class);
        self
    }

    pub fn is_retryable(&self, error: &HandlerError) -> bool {
        !self.non_retryable.contains(&error.class)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether another attempt follows a failed attempt number `attempt`
    /// (starting at 1).
    pub fn should_retry(&self, error: &HandlerError, attempt: u32) -> bool {
        self.is_retryable(error) && attempt < self.max_attempts()
    }
}
