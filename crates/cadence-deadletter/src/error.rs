//! Dead-letter pipeline errors.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a handler failure, used to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// May succeed on a later attempt.
    Transient,
    /// The payload could not be decoded.
    Serialization,
    /// The payload decoded but was rejected.
    Validation,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Serialization => "serialization",
            ErrorClass::Validation => "validation",
        };
        f.write_str(name)
    }
}

/// Failure returned by a record handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class} error: {message}")]
pub struct HandlerError {
    pub class: ErrorClass,
    pub message: String,
}

impl HandlerError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Serialization, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, message)
    }
}

/// Transport and recovery errors.
#[derive(Debug, Error)]
pub enum DeadLetterError {
    /// Polling, committing or sending failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The dead-letter record could not be written. The original record
    /// stays uncommitted.
    #[error("Failed to dead-letter {topic}-{partition}@{offset}: {message}")]
    DeadLetterWrite {
        topic: String,
        partition: i32,
        offset: i64,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DeadLetterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_display() {
        let err = HandlerError::serialization("unexpected end of input");
        assert_eq!(err.to_string(), "serialization error: unexpected end of input");
        assert_eq!(err.class, ErrorClass::Serialization);
    }

    #[test]
    fn test_dead_letter_write_display() {
        let err = DeadLetterError::DeadLetterWrite {
            topic: "orders".to_string(),
            partition: 2,
            offset: 41,
            message: "broker down".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to dead-letter orders-2@41: broker down");
    }
}
