//! Job and trigger identities.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};

/// Suffix appended to the job name to derive its trigger name.
pub const TRIGGER_SUFFIX: &str = "_trigger";

/// Identity of a job: a (name, group) pair of opaque, non-empty strings.
///
/// Ordering is by group, then name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    group: String,
    name: String,
}

impl JobKey {
    /// Create a key, rejecting empty components.
    pub fn new(name: impl Into<String>, group: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let group = group.into();
        if name.is_empty() {
            return Err(SchedulerError::InvalidKey("job name cannot be empty".to_string()));
        }
        if group.is_empty() {
            return Err(SchedulerError::InvalidKey(format!(
                "job group cannot be empty (name '{}')",
                name
            )));
        }
        Ok(Self { group, name })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// The key of the single trigger driving this job.
    pub fn trigger_key(&self) -> TriggerKey {
        TriggerKey {
            group: self.group.clone(),
            name: format!("{}{}", self.name, TRIGGER_SUFFIX),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}

/// Identity of a trigger, derived from its job key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TriggerKey {
    group: String,
    name: String,
}

impl TriggerKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &str {
        &self.group
    }
}

impl fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.group, self.name)
    }
}
