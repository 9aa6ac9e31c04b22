//! Administrative surface: add, update, pause, resume, delete, run now and
//! query jobs.
//!
//! Every mutation takes effect in the registry before the call returns, so
//! a following query observes it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::engine::SchedulerEngine;
use crate::error::{Result, SchedulerError};
use crate::job::{ExecutionContext, JobDataMap, JobDefinition};
use crate::key::JobKey;
use crate::registry::{JobRegistry, RegisteredJob};
use crate::schedule::{CronExpression, MisfirePolicy, RepeatCount, Schedule};
use crate::trigger::{Trigger, TriggerState};

/// A row of the job listing.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_name: String,
    pub job_group: String,
    /// The job's own description, or the trigger description without one.
    pub description: String,
    /// `Trigger: group.name_trigger`.
    pub trigger_description: String,
    pub job_status: TriggerState,
    /// Cron expression, or the interval in readable form.
    pub job_time: String,
    pub schedule_kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub misfire_policy: Option<MisfirePolicy>,
    pub allow_concurrent: bool,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    pub times_triggered: u64,
    pub run_count: u64,
    pub fail_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub data: JobDataMap,
}

impl JobSummary {
    fn new(definition: &JobDefinition, trigger: &Trigger) -> Self {
        Self {
            job_name: definition.key.name().to_string(),
            job_group: definition.key.group().to_string(),
            description: definition
                .description
                .clone()
                .unwrap_or_else(|| trigger.description()),
            trigger_description: trigger.description(),
            job_status: trigger.state,
            job_time: trigger.schedule.describe(),
            schedule_kind: trigger.schedule.kind(),
            misfire_policy: trigger.schedule.misfire_policy(),
            allow_concurrent: definition.allow_concurrent_execution,
            next_fire_time: trigger.next_fire_time,
            previous_fire_time: trigger.previous_fire_time,
            times_triggered: trigger.times_triggered,
            run_count: trigger.run_count,
            fail_count: trigger.fail_count,
            last_error: trigger.last_error.clone(),
            data: definition.data.clone(),
        }
    }
}

impl From<&RegisteredJob> for JobSummary {
    fn from(job: &RegisteredJob) -> Self {
        JobSummary::new(&job.definition, &job.trigger)
    }
}

/// An execution that is currently open.
#[derive(Debug, Clone, Serialize)]
pub struct RunningJob {
    #[serde(flatten)]
    pub summary: JobSummary,
    pub fire_instance_id: Uuid,
    pub scheduled_fire_time: DateTime<Utc>,
    pub actual_fire_time: DateTime<Utc>,
    pub off_cycle: bool,
}

pub struct JobAdmin {
    engine: Arc<SchedulerEngine>,
}

impl JobAdmin {
    pub fn new(engine: Arc<SchedulerEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<SchedulerEngine> {
        &self.engine
    }

    fn registry(&self) -> &JobRegistry {
        self.engine.registry()
    }

    /// Register a job on an interval schedule.
    ///
    /// Returns `Ok(false)` without changes if the key already exists.
    pub fn add_interval_job(
        &self,
        definition: JobDefinition,
        period_secs: u64,
        repeat: RepeatCount,
    ) -> Result<bool> {
        let schedule = Schedule::interval(period_secs, repeat)?;
        self.add_job(definition, schedule)
    }

    /// Register a job on a cron schedule.
    ///
    /// Returns `Ok(false)` without changes if the key already exists.
    pub fn add_cron_job(
        &self,
        definition: JobDefinition,
        expression: &str,
        misfire: Option<MisfirePolicy>,
    ) -> Result<bool> {
        let schedule = Schedule::cron(expression, misfire)?;
        self.add_job(definition, schedule)
    }

    pub fn add_job(&self, definition: JobDefinition, schedule: Schedule) -> Result<bool> {
        let key = definition.key.clone();
        let trigger = Trigger::new(key.clone(), schedule, self.engine.misfire_threshold(), Utc::now());
        let description = trigger.schedule.describe();
        let next = trigger.next_fire_time;

        if !self.registry().put(definition, trigger) {
            info!("Job {} already exists, skipping", key);
            return Ok(false);
        }
        match next {
            Some(next) => info!("Added job {} ({}), next fire at {}", key, description, next),
            None => info!("Added job {} ({}), it will never fire", key, description),
        }
        Ok(true)
    }

    /// Replace a job's schedule with a cron expression.
    ///
    /// Without a policy, a cron job keeps its current misfire policy and an
    /// interval job gets the default one.
    pub fn update_job(
        &self,
        key: &JobKey,
        expression: &str,
        misfire: Option<MisfirePolicy>,
    ) -> Result<JobSummary> {
        let expression = CronExpression::parse(expression)?;
        let now = Utc::now();
        let summary = self.registry().modify(key, |entry| {
            let misfire = misfire
                .or(entry.trigger.schedule.misfire_policy())
                .unwrap_or_default();
            entry.trigger.reschedule(Schedule::Cron { expression, misfire }, now);
            JobSummary::from(&*entry)
        })?;
        info!("Updated job {} to '{}'", key, summary.job_time);
        Ok(summary)
    }

    /// Replace a job's schedule with any schedule.
    pub fn reschedule_job(&self, key: &JobKey, schedule: Schedule) -> Result<JobSummary> {
        self.registry()
            .update_trigger(key, schedule, None, Utc::now())?;
        info!("Rescheduled job {}", key);
        self.get_job(key)
    }

    /// Remove a job and its trigger. Executions already running finish.
    pub fn delete_job(&self, key: &JobKey) -> Result<bool> {
        if !self.registry().remove(key) {
            return Err(SchedulerError::not_found(key));
        }
        self.engine.discard_deferred(key);
        info!("Deleted job {}", key);
        Ok(true)
    }

    /// Pause a job. Pausing a paused job is a no-op.
    pub fn pause_job(&self, key: &JobKey) -> Result<()> {
        let paused = self.registry().modify(key, |entry| entry.trigger.pause())?;
        if paused {
            self.engine.discard_deferred(key);
            info!("Paused job {}", key);
        }
        Ok(())
    }

    /// Resume a paused job from now. Resuming a running job is a no-op.
    pub fn resume_job(&self, key: &JobKey) -> Result<()> {
        let now = Utc::now();
        let resumed = self.registry().modify(key, |entry| entry.trigger.resume(now))?;
        if resumed {
            info!("Resumed job {}", key);
        }
        Ok(())
    }

    /// Fire a job once, immediately. Returns `false` if it is paused.
    pub fn run_job_now(&self, key: &JobKey) -> Result<bool> {
        self.engine.fire_now(key, Utc::now())
    }

    pub fn get_job(&self, key: &JobKey) -> Result<JobSummary> {
        self.registry()
            .get(key)
            .map(|job| JobSummary::from(&job))
            .ok_or_else(|| SchedulerError::not_found(key))
    }

    /// Every job, ordered by group then name.
    pub fn query_all_jobs(&self) -> Vec<JobSummary> {
        self.registry()
            .list_all()
            .iter()
            .map(JobSummary::from)
            .collect()
    }

    /// Every open execution, oldest first, with its job's current state.
    pub fn query_running_jobs(&self) -> Vec<RunningJob> {
        self.engine
            .dispatcher()
            .list_running()
            .into_iter()
            .map(|ctx| self.running_job(ctx))
            .collect()
    }

    fn running_job(&self, ctx: ExecutionContext) -> RunningJob {
        let summary = match self.registry().get(&ctx.job.key) {
            Some(job) => JobSummary::from(&job),
            None => JobSummary::new(&ctx.job, &ctx.trigger),
        };
        RunningJob {
            summary,
            fire_instance_id: ctx.fire_instance_id,
            scheduled_fire_time: ctx.scheduled_fire_time,
            actual_fire_time: ctx.actual_fire_time,
            off_cycle: ctx.off_cycle,
        }
    }
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
