//! Configuration validation.

use std::collections::HashSet;

use crate::error::ConfigError;
use crate::schema::{Config, ScheduledJob};

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Collapse into the first error, if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
///
/// Checks structure only. Cron expressions are parsed by the scheduler when
/// the jobs are registered.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> Result<ValidationResult, ConfigError> {
        let mut result = ValidationResult::default();

        Self::validate_scheduler(config, &mut result);
        Self::validate_jobs(config, &mut result);
        Self::validate_dead_letter(config, &mut result);
        Self::validate_logging(config, &mut result);

        Ok(result)
    }

    fn validate_scheduler(config: &Config, result: &mut ValidationResult) {
        let scheduler = &config.scheduler;

        if scheduler.poll_interval_ms == 0 {
            result.add_error(ValidationError::new(
                "scheduler.poll_interval_ms",
                "poll_interval_ms must be greater than 0",
            ));
        } else if scheduler.poll_interval_ms > 1000 {
            result.add_warning(ValidationWarning::new(
                "scheduler.poll_interval_ms",
                "poll interval above one second delays second-granularity cron triggers",
            ));
        }

        if scheduler.max_workers == 0 {
            result.add_error(ValidationError::new(
                "scheduler.max_workers",
                "max_workers must be greater than 0",
            ));
        }

        if scheduler.misfire_threshold_ms < scheduler.poll_interval_ms {
            result.add_warning(ValidationWarning::new(
                "scheduler.misfire_threshold_ms",
                "misfire threshold is shorter than the poll interval; on-time firings may be treated as misfires",
            ));
        }
    }

    fn validate_jobs(config: &Config, result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (index, job) in config.scheduler.jobs.iter().enumerate() {
            let path = format!("scheduler.jobs[{}]", index);

            if job.name.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.name", path),
                    "Job name cannot be empty",
                ));
            }
            if job.group.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.group", path),
                    "Job group cannot be empty",
                ));
            }
            if job.executable.is_empty() {
                result.add_error(ValidationError::new(
                    format!("{}.executable", path),
                    "Executable identifier cannot be empty",
                ));
            }

            if !seen.insert((job.group.as_str(), job.name.as_str())) {
                result.add_warning(ValidationWarning::new(
                    path.clone(),
                    format!(
                        "Job '{}.{}' is declared more than once; only the first declaration is registered",
                        job.group, job.name
                    ),
                ));
            }

            Self::validate_job_schedule(job, &path, result);
        }
    }

    fn validate_job_schedule(job: &ScheduledJob, path: &str, result: &mut ValidationResult) {
        match (&job.cron, job.interval_secs) {
            (Some(_), Some(_)) => result.add_error(ValidationError::new(
                path,
                "Set either cron or interval_secs, not both",
            )),
            (None, None) => result.add_error(ValidationError::new(
                path,
                "One of cron or interval_secs is required",
            )),
            (Some(expression), None) => {
                if expression.trim().is_empty() {
                    result.add_error(ValidationError::new(
                        format!("{}.cron", path),
                        "Cron expression cannot be empty",
                    ));
                }
                if let Some(code) = job.misfire {
                    if !(1..=3).contains(&code) {
                        result.add_error(ValidationError::new(
                            format!("{}.misfire", path),
                            format!("Unknown misfire code {}, valid values: 1, 2, 3", code),
                        ));
                    }
                }
                if job.repeat.is_some() {
                    result.add_warning(ValidationWarning::new(
                        format!("{}.repeat", path),
                        "repeat only applies to interval jobs and is ignored for cron jobs",
                    ));
                }
            }
            (None, Some(secs)) => {
                if secs == 0 {
                    result.add_error(ValidationError::new(
                        format!("{}.interval_secs", path),
                        "interval_secs must be greater than 0",
                    ));
                }
                if job.misfire.is_some() {
                    result.add_warning(ValidationWarning::new(
                        format!("{}.misfire", path),
                        "misfire only applies to cron jobs and is ignored for interval jobs",
                    ));
                }
            }
        }
    }

    fn validate_dead_letter(config: &Config, result: &mut ValidationResult) {
        let dead_letter = &config.dead_letter;

        if dead_letter.topic.is_empty() {
            result.add_error(ValidationError::new(
                "dead_letter.topic",
                "Dead-letter topic cannot be empty",
            ));
        }

        if dead_letter.max_retries > 10 {
            result.add_warning(ValidationWarning::new(
                "dead_letter.max_retries",
                "max_retries is very high (>10), failing records will block the partition for a long time",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        let level = config.logging.level.to_ascii_lowercase();
        if !valid_levels.contains(&level.as_str()) && !level.contains('=') {
            result.add_warning(ValidationWarning::new(
                "logging.level",
                format!(
                    "Unknown log level '{}', valid values: {:?}",
                    config.logging.level, valid_levels
                ),
            ));
        }
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
