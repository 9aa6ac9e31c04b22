//! Turns configuration into a running scheduler.

use std::time::Duration;

use tracing::{info, warn};

use cadence_config::{ScheduledJob, SchedulerConfig};
use cadence_scheduler::{
    EngineConfig, JobAdmin, JobCatalog, JobDefinition, JobKey, MisfirePolicy, RepeatCount,
    Result, Schedule, SchedulerError,
};

pub(crate) fn engine_config(config: &SchedulerConfig) -> EngineConfig {
    EngineConfig {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        misfire_threshold: Duration::from_millis(config.misfire_threshold_ms),
        max_workers: config.max_workers as usize,
        startup_delay: Duration::from_secs(config.startup_delay_secs),
    }
}

/// Schedule declared by a config entry.
pub(crate) fn schedule_for(job: &ScheduledJob) -> Result<Schedule> {
    match (&job.cron, job.interval_secs) {
        (Some(expression), _) => {
            let misfire = job.misfire.map(MisfirePolicy::from_code).transpose()?;
            Schedule::cron(expression, misfire)
        }
        (None, Some(secs)) => Schedule::interval(secs, RepeatCount::from(job.repeat)),
        (None, None) => Err(SchedulerError::InvalidSchedule {
            value: job.name.clone(),
            reason: "one of cron or interval_secs is required".to_string(),
        }),
    }
}

pub(crate) fn definition_for(job: &ScheduledJob, catalog: &JobCatalog) -> Result<JobDefinition> {
    let key = JobKey::new(job.name.as_str(), job.group.as_str())?;
    let executable = catalog.resolve(&job.executable)?;
    let mut definition = JobDefinition::new(key, executable)
        .with_data(job.data.clone())
        .with_concurrent_execution(job.allow_concurrent)
        .with_persisted_data(job.persist_data);
    if let Some(description) = &job.description {
        definition = definition.with_description(description.as_str());
    }
    Ok(definition)
}

/// Register every declared job. Returns how many were added.
///
/// Stops at the first entry that cannot be built; duplicates are skipped.
pub(crate) fn register_jobs(
    admin: &JobAdmin,
    catalog: &JobCatalog,
    jobs: &[ScheduledJob],
) -> Result<usize> {
    let mut added = 0;
    for job in jobs {
        let definition = definition_for(job, catalog)?;
        let key = definition.key.clone();
        let schedule = schedule_for(job)?;
        if admin.add_job(definition, schedule)? {
            added += 1;
        } else {
            warn!("Job {} already registered, skipping duplicate declaration", key);
        }
    }
    info!("Registered {} of {} configured jobs", added, jobs.len());
    Ok(added)
}
