//! Trigger state and fire-time evaluation.
//!
//! A trigger binds a [`Schedule`] to exactly one job and tracks when it
//! fires next. The engine calls [`Trigger::evaluate`] once per tick; the
//! trigger decides which scheduled times are due, applying the misfire
//! policy when the next fire time lags the clock by more than the
//! misfire threshold.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::key::{JobKey, TriggerKey};
use crate::schedule::{MisfirePolicy, Schedule};

/// Trigger lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerState {
    /// Idle, waiting for the next fire time.
    Waiting,
    /// Paused by an operator; never fires.
    Paused,
    /// A firing was handed to the dispatcher and is still open.
    Acquired,
    /// No future fire time exists.
    Complete,
    /// The last execution failed. Scheduling continues.
    Error,
    /// A firing is held back because a non-concurrent execution is open.
    Blocked,
}

impl fmt::Display for TriggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerState::Waiting => "WAITING",
            TriggerState::Paused => "PAUSED",
            TriggerState::Acquired => "ACQUIRED",
            TriggerState::Complete => "COMPLETE",
            TriggerState::Error => "ERROR",
            TriggerState::Blocked => "BLOCKED",
        };
        f.write_str(name)
    }
}

/// A scheduled time the trigger decided to fire for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    pub scheduled_fire_time: DateTime<Utc>,
    /// Produced by misfire handling rather than on time.
    pub misfired: bool,
}

#[derive(Debug, Clone)]
pub struct Trigger {
    pub key: TriggerKey,
    /// Fresh for every registration of the job. Survives reschedules.
    pub registration_id: Uuid,
    pub job_key: JobKey,
    pub schedule: Schedule,
    pub state: TriggerState,
    pub misfire_threshold: TimeDelta,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    /// Firings since the schedule was installed.
    pub times_triggered: u64,
    /// Finished executions, successful or not.
    pub run_count: u64,
    pub fail_count: u64,
    pub last_error: Option<String>,
}

impl Trigger {
    pub fn new(
        job_key: JobKey,
        schedule: Schedule,
        misfire_threshold: TimeDelta,
        now: DateTime<Utc>,
    ) -> Self {
        let mut trigger = Self {
            key: job_key.trigger_key(),
            registration_id: Uuid::new_v4(),
            job_key,
            schedule: schedule.clone(),
            state: TriggerState::Waiting,
            misfire_threshold,
            next_fire_time: None,
            previous_fire_time: None,
            times_triggered: 0,
            run_count: 0,
            fail_count: 0,
            last_error: None,
        };
        trigger.reschedule(schedule, now);
        trigger
    }

    /// Install a new schedule, recomputing the next fire time from `now`.
    ///
    /// A paused trigger stays paused.
    pub fn reschedule(&mut self, schedule: Schedule, now: DateTime<Utc>) {
        self.schedule = schedule;
        self.times_triggered = 0;
        if self.state == TriggerState::Paused {
            self.next_fire_time = None;
            return;
        }
        self.next_fire_time = self.initial_fire_time(now);
        self.state = if self.next_fire_time.is_some() {
            TriggerState::Waiting
        } else {
            TriggerState::Complete
        };
    }

    /// Pause the trigger. Returns `false` if it was already paused.
    pub fn pause(&mut self) -> bool {
        if self.state == TriggerState::Paused {
            return false;
        }
        self.state = TriggerState::Paused;
        self.next_fire_time = None;
        true
    }

    /// Resume a paused trigger from `now`. Missed occurrences while paused
    /// are not replayed. Returns `false` if it was not paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != TriggerState::Paused {
            return false;
        }
        self.next_fire_time = if self.is_exhausted() {
            None
        } else {
            self.schedule.fire_time_not_before(now)
        };
        self.state = if self.next_fire_time.is_some() {
            TriggerState::Waiting
        } else {
            TriggerState::Complete
        };
        true
    }

    pub fn is_exhausted(&self) -> bool {
        self.schedule
            .repeat_limit()
            .is_some_and(|limit| self.times_triggered >= u64::from(limit))
    }

    /// Decide which firings are due at `now` and advance the fire time.
    ///
    /// On-time firings (lag within the misfire threshold) are produced in
    /// order. The first late fire time switches to the misfire policy,
    /// after which the next fire time is strictly after `now`.
    pub fn evaluate(&mut self, now: DateTime<Utc>) -> Vec<Firing> {
        let mut firings = Vec::new();
        if matches!(self.state, TriggerState::Paused | TriggerState::Complete) {
            return firings;
        }

        while let Some(next) = self.next_fire_time {
            if next > now {
                break;
            }
            if now - next <= self.misfire_threshold {
                self.fire(next, false, &mut firings);
                continue;
            }
            self.apply_misfire(next, now, &mut firings);
            break;
        }

        if self.next_fire_time.is_none() {
            self.state = TriggerState::Complete;
        }
        firings
    }

    fn apply_misfire(&mut self, missed: DateTime<Utc>, now: DateTime<Utc>, firings: &mut Vec<Firing>) {
        let policy = self.schedule.misfire_policy();
        debug!(
            trigger = %self.key,
            missed = %missed,
            lag_ms = (now - missed).num_milliseconds(),
            policy = ?policy,
            "Trigger misfired"
        );

        match policy {
            // Interval schedules fire now and continue from now.
            None => self.fire(now, true, firings),
            Some(MisfirePolicy::DoNothing) => {
                self.next_fire_time = self.schedule.fire_time_after(now);
            }
            Some(MisfirePolicy::FireOnceAndProceed) => self.fire(now, true, firings),
            Some(MisfirePolicy::IgnoreMisfires) => {
                while let Some(at) = self.next_fire_time.filter(|at| *at <= now) {
                    self.fire(at, true, firings);
                }
            }
        }
    }

    fn fire(&mut self, scheduled: DateTime<Utc>, misfired: bool, firings: &mut Vec<Firing>) {
        firings.push(Firing {
            scheduled_fire_time: scheduled,
            misfired,
        });
        self.times_triggered += 1;
        self.previous_fire_time = Some(scheduled);
        self.next_fire_time = if self.is_exhausted() {
            None
        } else {
            self.schedule.fire_time_after(scheduled)
        };
    }

    fn initial_fire_time(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_exhausted() {
            return None;
        }
        self.schedule.first_fire_time(now)
    }

    /// A firing was accepted by the dispatcher.
    pub fn mark_acquired(&mut self) {
        if self.is_schedulable() {
            self.state = TriggerState::Acquired;
        }
    }

    /// A firing was deferred behind an open non-concurrent execution.
    pub fn mark_blocked(&mut self) {
        if self.is_schedulable() {
            self.state = TriggerState::Blocked;
        }
    }

    /// Record a finished execution.
    ///
    /// `still_open` is true when other executions of the same job are
    /// running. Paused and complete triggers keep their state.
    pub fn record_completion(&mut self, failure: Option<&str>, still_open: bool) {
        self.run_count += 1;
        match failure {
            Some(message) => {
                self.fail_count += 1;
                self.last_error = Some(message.to_string());
            }
            None => self.last_error = None,
        }

        if !self.is_schedulable() {
            return;
        }
        self.state = if still_open {
            TriggerState::Acquired
        } else if failure.is_some() {
            TriggerState::Error
        } else {
            TriggerState::Waiting
        };
    }

    fn is_schedulable(&self) -> bool {
        !matches!(self.state, TriggerState::Paused | TriggerState::Complete)
    }

    /// Description shown in job listings.
    pub fn description(&self) -> String {
        format!("Trigger: {}", self.key)
    }
}

#[cfg(test)]
#[path = "trigger_tests.rs"]
mod tests;
