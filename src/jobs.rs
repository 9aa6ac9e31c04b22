//! Built-in executables that config-declared jobs can name.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::info;

use cadence_deadletter::MemoryRecordSource;
use cadence_scheduler::{ExecutionContext, Job, JobAdmin, JobCatalog, JobError};

/// Logs its key and data.
pub(crate) struct LogJob;

#[async_trait]
impl Job for LogJob {
    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), JobError> {
        let message = ctx
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("tick");
        info!(
            job = %ctx.job_key(),
            fire_instance_id = %ctx.fire_instance_id,
            off_cycle = ctx.off_cycle,
            "{}",
            message
        );
        Ok(())
    }
}

/// Logs one line per registered job.
pub(crate) struct ReportJob {
    admin: Weak<JobAdmin>,
}

impl ReportJob {
    pub(crate) fn new(admin: &Arc<JobAdmin>) -> Self {
        Self {
            admin: Arc::downgrade(admin),
        }
    }
}

#[async_trait]
impl Job for ReportJob {
    async fn execute(&self, _ctx: &mut ExecutionContext) -> Result<(), JobError> {
        let admin = self
            .admin
            .upgrade()
            .ok_or_else(|| JobError::failed("scheduler is shutting down"))?;

        let jobs = admin.query_all_jobs();
        let running = admin.query_running_jobs().len();
        info!("{} jobs registered, {} running", jobs.len(), running);
        for job in &jobs {
            info!(
                "  {}.{} [{:?}] {} next={} runs={} failures={}",
                job.job_group,
                job.job_name,
                job.job_status,
                job.job_time,
                job.next_fire_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                job.run_count,
                job.fail_count
            );
        }
        Ok(())
    }
}

/// Appends `data.payload` to the event topic.
///
/// String payloads go out as raw bytes, anything else as JSON. The job key
/// becomes the record key and `published` counts successful appends.
pub(crate) struct PublishJob {
    events: Arc<MemoryRecordSource>,
}

impl PublishJob {
    pub(crate) fn new(events: Arc<MemoryRecordSource>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Job for PublishJob {
    async fn execute(&self, ctx: &mut ExecutionContext) -> Result<(), JobError> {
        let payload = ctx
            .get("payload")
            .cloned()
            .ok_or_else(|| JobError::failed("missing 'payload' in job data"))?;
        let value = match payload {
            serde_json::Value::String(text) => text.into_bytes(),
            other => serde_json::to_vec(&other)
                .map_err(|e| JobError::failed(format!("payload is not serializable: {}", e)))?,
        };

        let key = ctx.job_key().to_string().into_bytes();
        let offset = self.events.push(Some(key), value);

        let published = ctx.get("published").and_then(|v| v.as_u64()).unwrap_or(0);
        ctx.put("published", published + 1);
        info!(
            "Published event for {} to {} at offset {}",
            ctx.job_key(),
            self.events.topic(),
            offset
        );
        Ok(())
    }
}

/// Catalog of the built-in executables: `log`, `report` and `publish`.
pub(crate) fn builtin_catalog(
    admin: &Arc<JobAdmin>,
    events: &Arc<MemoryRecordSource>,
) -> JobCatalog {
    let mut catalog = JobCatalog::new();
    catalog
        .register("log", Arc::new(LogJob))
        .register("report", Arc::new(ReportJob::new(admin)))
        .register("publish", Arc::new(PublishJob::new(events.clone())));
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_deadletter::RecordSource;
    use cadence_scheduler::{
        EngineConfig, JobDefinition, JobKey, JobRegistry, RepeatCount, Schedule, SchedulerEngine,
        Trigger,
    };
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;

    fn context(job: Arc<dyn Job>, data: serde_json::Value) -> ExecutionContext {
        let key = JobKey::new("emit", "events").unwrap();
        let data = match data {
            serde_json::Value::Object(map) => map,
            _ => panic!("job data must be an object"),
        };
        let definition = JobDefinition::new(key.clone(), job).with_data(data);
        let now = Utc::now();
        let schedule = Schedule::interval(10, RepeatCount::Infinite).unwrap();
        let trigger = Trigger::new(key, schedule, TimeDelta::seconds(60), now);
        ExecutionContext::new(&definition, &trigger, now, now)
    }

    fn admin() -> Arc<JobAdmin> {
        let registry = Arc::new(JobRegistry::new());
        let engine = Arc::new(SchedulerEngine::new(registry, EngineConfig::default()));
        Arc::new(JobAdmin::new(engine))
    }

    #[tokio::test]
    async fn test_publish_string_payload_as_raw_bytes() {
        let events = Arc::new(MemoryRecordSource::new("cadence-events"));
        let job: Arc<dyn Job> = Arc::new(PublishJob::new(events.clone()));
        let mut ctx = context(job.clone(), serde_json::json!({"payload": "hello"}));

        job.execute(&mut ctx).await.unwrap();

        let record = events.poll(Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(record.value, b"hello".to_vec());
        assert_eq!(record.key.as_deref(), Some(b"events.emit".as_slice()));
        assert_eq!(ctx.get("published"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_publish_object_payload_as_json() {
        let events = Arc::new(MemoryRecordSource::new("cadence-events"));
        let job: Arc<dyn Job> = Arc::new(PublishJob::new(events.clone()));
        let mut ctx = context(
            job.clone(),
            serde_json::json!({"payload": {"fail": true}, "published": 4}),
        );

        job.execute(&mut ctx).await.unwrap();

        let record = events.poll(Duration::ZERO).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&record.value).unwrap();
        assert_eq!(value, serde_json::json!({"fail": true}));
        assert_eq!(ctx.get("published"), Some(&serde_json::json!(5)));
    }

    #[tokio::test]
    async fn test_publish_without_payload_fails() {
        let events = Arc::new(MemoryRecordSource::new("cadence-events"));
        let job: Arc<dyn Job> = Arc::new(PublishJob::new(events.clone()));
        let mut ctx = context(job.clone(), serde_json::json!({}));

        let err = job.execute(&mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("payload"));
        assert_eq!(events.pending(), 0);
    }

    #[tokio::test]
    async fn test_report_fails_once_admin_is_gone() {
        let admin = admin();
        let job: Arc<dyn Job> = Arc::new(ReportJob::new(&admin));
        let mut ctx = context(job.clone(), serde_json::json!({}));
        job.execute(&mut ctx).await.unwrap();

        drop(admin);
        assert!(job.execute(&mut ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_log_job_succeeds() {
        let job: Arc<dyn Job> = Arc::new(LogJob);
        let mut ctx = context(job.clone(), serde_json::json!({"message": "hello"}));
        job.execute(&mut ctx).await.unwrap();
    }

    #[test]
    fn test_builtin_catalog_ids() {
        let admin = admin();
        let events = Arc::new(MemoryRecordSource::new("cadence-events"));
        let catalog = builtin_catalog(&admin, &events);
        assert_eq!(catalog.ids(), vec!["log", "publish", "report"]);
    }
}
