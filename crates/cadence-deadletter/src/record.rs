//! Broker-agnostic record types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error message of the final failed attempt.
pub const ORIGIN_ERROR_MSG: &str = "ORIGIN_ERROR_MSG";
pub const ORIGIN_TOPIC: &str = "ORIGIN_TOPIC";
pub const ORIGIN_PARTITION: &str = "ORIGIN_PARTITION";
pub const ORIGIN_OFFSET: &str = "ORIGIN_OFFSET";
/// Original record timestamp in epoch milliseconds.
pub const ORIGIN_TIMESTAMP: &str = "ORIGIN_TIMESTAMP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

impl Header {
    /// A header with a UTF-8 text value.
    pub fn text(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into().into_bytes(),
        }
    }

    pub fn value_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// A record read from a topic partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl ConsumerRecord {
    /// Lossy UTF-8 view of the value, for logging.
    pub fn value_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value).into_owned()
    }
}

impl fmt::Display for ConsumerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}@{}", self.topic, self.partition, self.offset)
    }
}

/// A record to publish. A missing partition lets the sink choose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRecord {
    pub topic: String,
    pub partition: Option<i32>,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    #[serde(default)]
    pub headers: Vec<Header>,
}

impl ProducerRecord {
    /// First header with this key, as text.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .and_then(Header::value_str)
    }
}
