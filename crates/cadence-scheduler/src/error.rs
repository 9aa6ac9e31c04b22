//! Scheduler error types.

use thiserror::Error;

use crate::key::JobKey;

/// Errors surfaced by the administrative surface and the registry.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The referenced job does not exist.
    #[error("Job not found: {key}")]
    NotFound { key: JobKey },

    /// Malformed cron expression, non-positive interval or unknown misfire code.
    #[error("Invalid schedule '{value}': {reason}")]
    InvalidSchedule { value: String, reason: String },

    /// Empty job name or group.
    #[error("Invalid job key: {0}")]
    InvalidKey(String),

    /// No executable registered under the identifier.
    #[error("Unknown executable: {0}")]
    UnknownExecutable(String),
}

impl SchedulerError {
    pub(crate) fn not_found(key: &JobKey) -> Self {
        SchedulerError::NotFound { key: key.clone() }
    }

    pub(crate) fn invalid_schedule(value: impl Into<String>, reason: impl Into<String>) -> Self {
        SchedulerError::InvalidSchedule {
            value: value.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Failure raised by a job body.
///
/// Never propagated into the engine; it only shows up in trigger state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("Job execution failed: {0}")]
    Failed(String),

    #[error("Job panicked: {0}")]
    Panicked(String),

    #[error("Job could not start: {0}")]
    NotStarted(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}
