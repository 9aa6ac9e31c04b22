//! Configuration schema definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub dead_letter: DeadLetterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduler engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the engine evaluates triggers, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Lateness beyond which a firing counts as misfired, in milliseconds.
    #[serde(default = "default_misfire_threshold_ms")]
    pub misfire_threshold_ms: u64,

    /// Size of the execution worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: u32,

    /// Delay before the first engine tick after startup.
    #[serde(default)]
    pub startup_delay_secs: u64,

    /// Jobs registered at startup.
    #[serde(default)]
    pub jobs: Vec<ScheduledJob>,
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_misfire_threshold_ms() -> u64 {
    60_000
}

fn default_max_workers() -> u32 {
    10
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            misfire_threshold_ms: default_misfire_threshold_ms(),
            max_workers: default_max_workers(),
            startup_delay_secs: 0,
            jobs: Vec::new(),
        }
    }
}

/// A job registered from configuration.
///
/// Exactly one of `cron` or `interval_secs` must be set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Job name, unique within its group.
    pub name: String,

    /// Job group.
    #[serde(default = "default_group")]
    pub group: String,

    /// Identifier of a pre-registered executable.
    pub executable: String,

    /// Cron expression (seconds first, optional year).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    /// Misfire policy code for cron jobs (1 = do nothing, 2 = fire once, 3 = ignore misfires).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misfire: Option<u8>,

    /// Fixed interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,

    /// Total number of firings for interval jobs; unset repeats forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeat: Option<u32>,

    #[serde(default = "default_true")]
    pub allow_concurrent: bool,

    #[serde(default)]
    pub persist_data: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Data handed to every execution.
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

fn default_group() -> String {
    "DEFAULT".to_string()
}

pub(crate) fn default_true() -> bool {
    true
}

/// Retry and dead-letter pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterConfig {
    /// Destination for records that exhausted their retries.
    #[serde(default = "default_dead_letter_topic")]
    pub topic: String,

    /// Retries after the first failed delivery.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Idle wait when the source has nothing to deliver, in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_dead_letter_topic() -> String {
    "dead-letter-queue".to_string()
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_poll_timeout_ms() -> u64 {
    3000
}

impl Default for DeadLetterConfig {
    fn default() -> Self {
        Self {
            topic: default_dead_letter_topic(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; `~` is expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.poll_interval_ms, 200);
        assert_eq!(config.misfire_threshold_ms, 60_000);
        assert_eq!(config.max_workers, 10);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_dead_letter_defaults() {
        let config = DeadLetterConfig::default();
        assert_eq!(config.topic, "dead-letter-queue");
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.backoff_ms, 1000);
    }

    #[test]
    fn test_scheduled_job_defaults() {
        let job: ScheduledJob = toml::from_str(
            r#"
            name = "heartbeat"
            executable = "log"
            cron = "0/10 * * * * ?"
            "#,
        )
        .unwrap();
        assert_eq!(job.group, "DEFAULT");
        assert!(job.allow_concurrent);
        assert!(!job.persist_data);
        assert!(job.misfire.is_none());
        assert!(job.data.is_empty());
    }
}
