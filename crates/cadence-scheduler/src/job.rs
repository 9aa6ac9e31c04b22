//! Job definitions and the execution contract.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::JobError;
use crate::key::JobKey;
use crate::trigger::Trigger;

/// String-keyed job parameters.
pub type JobDataMap = serde_json::Map<String, serde_json::Value>;

/// A unit of work the scheduler can run.
///
/// Implementations receive a per-firing context and may mutate its data;
/// mutations are written back only for jobs that persist data.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), JobError>;
}

/// Adapter running a synchronous closure as a job.
pub struct FnJob<F> {
    f: F,
}

impl<F> FnJob<F>
where
    F: Fn(&mut ExecutionContext) -> Result<(), JobError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Job for FnJob<F>
where
    F: Fn(&mut ExecutionContext) -> Result<(), JobError> + Send + Sync + 'static,
{
    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), JobError> {
        (self.f)(ctx)
    }
}

/// Wrap a closure into a shareable job.
pub fn job_fn<F>(f: F) -> Arc<dyn Job>
where
    F: Fn(&mut ExecutionContext) -> Result<(), JobError> + Send + Sync + 'static,
{
    Arc::new(FnJob::new(f))
}

/// A registered job: identity, executable and parameters.
#[derive(Clone)]
pub struct JobDefinition {
    pub key: JobKey,
    pub executable: Arc<dyn Job>,
    pub data: JobDataMap,
    /// When false, at most one execution of this job is open at a time.
    pub allow_concurrent_execution: bool,
    /// Write the context's data back after each execution.
    pub persist_data_after_execution: bool,
    pub description: Option<String>,
}

impl JobDefinition {
    pub fn new(key: JobKey, executable: Arc<dyn Job>) -> Self {
        Self {
            key,
            executable,
            data: JobDataMap::new(),
            allow_concurrent_execution: true,
            persist_data_after_execution: false,
            description: None,
        }
    }

    pub fn with_data(mut self, data: JobDataMap) -> Self {
        self.data = data;
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_concurrent_execution(mut self, allow: bool) -> Self {
        self.allow_concurrent_execution = allow;
        self
    }

    pub fn with_persisted_data(mut self, persist: bool) -> Self {
        self.persist_data_after_execution = persist;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDefinition")
            .field("key", &self.key)
            .field("data", &self.data)
            .field("allow_concurrent_execution", &self.allow_concurrent_execution)
            .field("persist_data_after_execution", &self.persist_data_after_execution)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Per-firing context handed to a job.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub fire_instance_id: Uuid,
    pub job: JobDefinition,
    /// Snapshot of the trigger when the firing was created.
    pub trigger: Trigger,
    pub scheduled_fire_time: DateTime<Utc>,
    /// When the dispatcher accepted the firing.
    pub actual_fire_time: DateTime<Utc>,
    /// Working copy of the job data.
    pub data: JobDataMap,
    /// Created by an explicit run-now request.
    pub off_cycle: bool,
}

impl ExecutionContext {
    pub fn new(
        job: &JobDefinition,
        trigger: &Trigger,
        scheduled_fire_time: DateTime<Utc>,
        actual_fire_time: DateTime<Utc>,
    ) -> Self {
        Self {
            fire_instance_id: Uuid::new_v4(),
            job: job.clone(),
            trigger: trigger.clone(),
            scheduled_fire_time,
            actual_fire_time,
            data: job.data.clone(),
            off_cycle: false,
        }
    }

    pub fn off_cycle(mut self) -> Self {
        self.off_cycle = true;
        self
    }

    pub fn job_key(&self) -> &JobKey {
        &self.job.key
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.data.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{RepeatCount, Schedule};
    use chrono::TimeDelta;

    fn definition() -> JobDefinition {
        let key = JobKey::new("j1", "g").unwrap();
        JobDefinition::new(key, job_fn(|_| Ok(())))
    }

    #[test]
    fn test_definition_defaults() {
        let def = definition();
        assert!(def.allow_concurrent_execution);
        assert!(!def.persist_data_after_execution);
        assert!(def.data.is_empty());
        assert!(def.description.is_none());
    }

    #[test]
    fn test_definition_builder() {
        let def = definition()
            .with_value("table", "sessions")
            .with_value("limit", 100)
            .with_concurrent_execution(false)
            .with_persisted_data(true)
            .with_description("cleanup");
        assert_eq!(def.data["table"], "sessions");
        assert_eq!(def.data["limit"], 100);
        assert!(!def.allow_concurrent_execution);
        assert!(def.persist_data_after_execution);
        assert_eq!(def.description.as_deref(), Some("cleanup"));

        let debug = format!("{:?}", def);
        assert!(debug.contains("cleanup"));
    }

    #[tokio::test]
    async fn test_context_carries_data_copy() {
        let def = definition().with_value("count", 1);
        let now = Utc::now();
        let schedule = Schedule::interval(5, RepeatCount::Infinite).unwrap();
        let trigger = Trigger::new(def.key.clone(), schedule, TimeDelta::seconds(1), now);

        let job = job_fn(|ctx| {
            let count = ctx.get("count").and_then(|v| v.as_i64()).unwrap_or(0);
            ctx.put("count", count + 1);
            Ok(())
        });

        let mut ctx = ExecutionContext::new(&def, &trigger, now, now);
        job.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.data["count"], 2);
        assert_eq!(def.data["count"], 1);
        assert_eq!(ctx.job_key(), &def.key);
        assert!(!ctx.off_cycle);
        assert!(ctx.clone().off_cycle().off_cycle);
    }
}
