//! Schedules: the two supported recurrence rules.
//!
//! - [`Schedule::Interval`]: fixed period, finite or infinite repeats
//! - [`Schedule::Cron`]: seconds-resolution cron expression plus a misfire policy
//!
//! Cron expressions use six or seven fields, seconds first, with an
//! optional trailing year (`0/5 * * * * ?`, `0 0 12 * * ? 2030`).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchedulerError};

/// What the engine does when a cron trigger's scheduled time passed
/// beyond the misfire threshold without firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MisfirePolicy {
    /// Skip every missed occurrence and wait for the next future one.
    DoNothing,
    /// Fire once immediately, then continue with the normal cadence.
    #[default]
    FireOnceAndProceed,
    /// Fire every missed occurrence, in order, as fast as possible.
    IgnoreMisfires,
}

impl MisfirePolicy {
    /// Map the numeric codes used in job configuration.
    ///
    /// `1` does nothing, `2` fires once and proceeds, `3` ignores misfires.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            1 => Ok(MisfirePolicy::DoNothing),
            2 => Ok(MisfirePolicy::FireOnceAndProceed),
            3 => Ok(MisfirePolicy::IgnoreMisfires),
            other => Err(SchedulerError::invalid_schedule(
                other.to_string(),
                "unknown misfire code, valid values: 1, 2, 3",
            )),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MisfirePolicy::DoNothing => 1,
            MisfirePolicy::FireOnceAndProceed => 2,
            MisfirePolicy::IgnoreMisfires => 3,
        }
    }
}

impl fmt::Display for MisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MisfirePolicy::DoNothing => "do_nothing",
            MisfirePolicy::FireOnceAndProceed => "fire_once_and_proceed",
            MisfirePolicy::IgnoreMisfires => "ignore_misfires",
        };
        f.write_str(name)
    }
}

/// How many times an interval schedule fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatCount {
    /// Exactly this many firings in total.
    Finite(u32),
    Infinite,
}

impl RepeatCount {
    pub fn limit(self) -> Option<u32> {
        match self {
            RepeatCount::Finite(n) => Some(n),
            RepeatCount::Infinite => None,
        }
    }
}

impl From<Option<u32>> for RepeatCount {
    fn from(value: Option<u32>) -> Self {
        value.map_or(RepeatCount::Infinite, RepeatCount::Finite)
    }
}

/// A parsed cron expression that remembers its source text.
#[derive(Clone)]
pub struct CronExpression {
    source: String,
    schedule: cron::Schedule,
}

impl CronExpression {
    pub fn parse(expression: &str) -> Result<Self> {
        let source = expression.trim();
        if source.is_empty() {
            return Err(SchedulerError::invalid_schedule(
                expression,
                "cron expression cannot be empty",
            ));
        }
        let schedule = cron::Schedule::from_str(source)
            .map_err(|e| SchedulerError::invalid_schedule(source, e.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            schedule,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First occurrence strictly after `after`.
    pub fn next_after(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(after).next()
    }

    /// First occurrence at or after the exact instant `from`.
    pub fn next_not_before(&self, from: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.next_after(&(*from - TimeDelta::nanoseconds(1)))
    }

    /// First occurrence at or after `from`, at whole-second resolution.
    pub fn next_at_or_after(&self, from: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        let second = from
            .duration_trunc(TimeDelta::seconds(1))
            .unwrap_or(*from);
        self.next_after(&(second - TimeDelta::milliseconds(1)))
    }
}

impl fmt::Debug for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CronExpression").field(&self.source).finish()
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CronExpression {}

impl FromStr for CronExpression {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for CronExpression {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CronExpression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        CronExpression::parse(&source).map_err(serde::de::Error::custom)
    }
}

/// A recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Interval {
        period_secs: u64,
        repeat: RepeatCount,
    },
    Cron {
        expression: CronExpression,
        misfire: MisfirePolicy,
    },
}

impl Schedule {
    /// Interval schedule; the period must be positive.
    pub fn interval(period_secs: u64, repeat: RepeatCount) -> Result<Self> {
        period_delta(period_secs)?;
        Ok(Schedule::Interval {
            period_secs,
            repeat,
        })
    }

    /// Cron schedule; a missing policy means [`MisfirePolicy::FireOnceAndProceed`].
    pub fn cron(expression: &str, misfire: Option<MisfirePolicy>) -> Result<Self> {
        Ok(Schedule::Cron {
            expression: CronExpression::parse(expression)?,
            misfire: misfire.unwrap_or_default(),
        })
    }

    /// Replace the misfire policy of a cron schedule. Interval schedules are
    /// returned unchanged.
    pub fn with_misfire(self, policy: Option<MisfirePolicy>) -> Self {
        match (self, policy) {
            (Schedule::Cron { expression, .. }, Some(misfire)) => {
                Schedule::Cron { expression, misfire }
            }
            (schedule, _) => schedule,
        }
    }

    pub fn misfire_policy(&self) -> Option<MisfirePolicy> {
        match self {
            Schedule::Cron { misfire, .. } => Some(*misfire),
            Schedule::Interval { .. } => None,
        }
    }

    /// Total number of firings allowed, if bounded.
    pub fn repeat_limit(&self) -> Option<u32> {
        match self {
            Schedule::Interval { repeat, .. } => repeat.limit(),
            Schedule::Cron { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Schedule::Interval { .. } => "interval",
            Schedule::Cron { .. } => "cron",
        }
    }

    /// The first fire time for a schedule installed at `from`.
    ///
    /// Interval schedules fire immediately; cron schedules fire at the first
    /// matching second at or after `from`.
    pub fn first_fire_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval { .. } => Some(from),
            Schedule::Cron { expression, .. } => expression.next_at_or_after(&from),
        }
    }

    /// The first fire time no earlier than `from`, used when a paused
    /// trigger resumes.
    pub fn fire_time_not_before(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval { .. } => Some(from),
            Schedule::Cron { expression, .. } => expression.next_not_before(&from),
        }
    }

    /// The fire time that follows `after`, ignoring repeat limits.
    pub fn fire_time_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Schedule::Interval { period_secs, .. } => {
                let period = period_delta(*period_secs).ok()?;
                after.checked_add_signed(period)
            }
            Schedule::Cron { expression, .. } => expression.next_after(&after),
        }
    }

    /// Human-readable form used in job listings.
    pub fn describe(&self) -> String {
        match self {
            Schedule::Interval {
                period_secs,
                repeat: RepeatCount::Infinite,
            } => format!("every {}s", period_secs),
            Schedule::Interval {
                period_secs,
                repeat: RepeatCount::Finite(n),
            } => format!("every {}s, {} times", period_secs, n),
            Schedule::Cron { expression, .. } => expression.as_str().to_string(),
        }
    }
}

fn period_delta(period_secs: u64) -> Result<TimeDelta> {
    if period_secs == 0 {
        return Err(SchedulerError::invalid_schedule(
            "0",
            "interval period must be greater than 0",
        ));
    }
    i64::try_from(period_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| {
            SchedulerError::invalid_schedule(period_secs.to_string(), "interval period is too large")
        })
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
