//! Scheduler engine.
//!
//! Drives every trigger in the registry from a single tick loop. Each tick:
//!
//! 1. applies finished executions reported by the dispatcher
//! 2. retries firings deferred behind a non-concurrent execution
//! 3. evaluates every trigger and dispatches the firings that are due
//!
//! At most one deferred firing is kept per job; later ones coalesce into it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::dispatcher::{Completion, ExecutionDispatcher, SubmitOutcome};
use crate::error::Result;
use crate::job::ExecutionContext;
use crate::key::JobKey;
use crate::registry::{JobRegistry, RegisteredJob};
use crate::trigger::TriggerState;

/// Engine tuning.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Tick period.
    pub poll_interval: Duration,
    /// Maximum lag before a fire time counts as misfired.
    pub misfire_threshold: Duration,
    /// Concurrent executions across all jobs.
    pub max_workers: usize,
    /// Delay before the first tick.
    pub startup_delay: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            misfire_threshold: Duration::from_secs(60),
            max_workers: 10,
            startup_delay: Duration::ZERO,
        }
    }
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Firings accepted by the dispatcher.
    pub dispatched: usize,
    /// Firings parked behind an open execution.
    pub deferred: usize,
    /// Firings merged into an already parked one.
    pub coalesced: usize,
    /// Firings produced by misfire handling.
    pub misfired: usize,
    pub completed: usize,
    pub failed: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == TickReport::default()
    }
}

pub struct SchedulerEngine {
    registry: Arc<JobRegistry>,
    dispatcher: Arc<ExecutionDispatcher>,
    completions: Mutex<mpsc::UnboundedReceiver<Completion>>,
    deferred: Mutex<HashMap<JobKey, ExecutionContext>>,
    config: EngineConfig,
}

impl SchedulerEngine {
    pub fn new(registry: Arc<JobRegistry>, config: EngineConfig) -> Self {
        let (dispatcher, completions) = ExecutionDispatcher::new(config.max_workers);
        Self {
            registry,
            dispatcher: Arc::new(dispatcher),
            completions: Mutex::new(completions),
            deferred: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<ExecutionDispatcher> {
        &self.dispatcher
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn misfire_threshold(&self) -> TimeDelta {
        TimeDelta::from_std(self.config.misfire_threshold).unwrap_or(TimeDelta::MAX)
    }

    /// Run one scheduling pass at `now`.
    pub fn tick(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        self.apply_completions(&mut report);
        self.retry_deferred(now, &mut report);

        for key in self.registry.keys() {
            self.registry.with_entry_mut(&key, |entry| {
                for firing in entry.trigger.evaluate(now) {
                    if firing.misfired {
                        report.misfired += 1;
                    }
                    let ctx = ExecutionContext::new(
                        &entry.definition,
                        &entry.trigger,
                        firing.scheduled_fire_time,
                        now,
                    );
                    self.dispatch(entry, ctx, &mut report);
                }
            });
        }

        report
    }

    /// Fire a job immediately, outside its schedule.
    ///
    /// Returns `false` without firing when the job is paused.
    pub fn fire_now(&self, key: &JobKey, now: DateTime<Utc>) -> Result<bool> {
        self.registry.modify(key, |entry| {
            if entry.trigger.state == TriggerState::Paused {
                warn!("Not firing paused job {}", key);
                return false;
            }
            let ctx = ExecutionContext::new(&entry.definition, &entry.trigger, now, now).off_cycle();
            info!("Firing job {} now ({})", key, ctx.fire_instance_id);
            let mut report = TickReport::default();
            self.dispatch(entry, ctx, &mut report);
            true
        })
    }

    /// Drop any deferred firing for a job.
    pub fn discard_deferred(&self, key: &JobKey) -> bool {
        let discarded = self.deferred.lock().remove(key).is_some();
        if discarded {
            debug!("Discarded deferred firing of {}", key);
        }
        discarded
    }

    pub fn deferred_count(&self) -> usize {
        self.deferred.lock().len()
    }

    /// Tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Scheduler engine starting: poll {:?}, misfire threshold {:?}, {} workers, {} jobs",
            self.config.poll_interval,
            self.config.misfire_threshold,
            self.config.max_workers,
            self.registry.len()
        );

        if !self.config.startup_delay.is_zero() {
            info!("Delaying first tick by {:?}", self.config.startup_delay);
            tokio::select! {
                _ = tokio::time::sleep(self.config.startup_delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler engine stopped before first tick");
                        return;
                    }
                }
            }
        }

        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let report = self.tick(Utc::now());
                    if !report.is_idle() {
                        debug!(?report, "Tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Scheduler engine shutting down");
                        break;
                    }
                }
            }
        }

        // Settle whatever finished while we were stopping.
        let report = self.tick_completions_only();
        debug!(?report, "Final completions applied");
    }

    fn tick_completions_only(&self) -> TickReport {
        let mut report = TickReport::default();
        self.apply_completions(&mut report);
        report
    }

    fn dispatch(&self, entry: &mut RegisteredJob, ctx: ExecutionContext, report: &mut TickReport) {
        match self.dispatcher.submit(ctx) {
            SubmitOutcome::Accepted => {
                entry.trigger.mark_acquired();
                report.dispatched += 1;
            }
            SubmitOutcome::Deferred(ctx) => {
                entry.trigger.mark_blocked();
                self.defer(*ctx, report);
            }
        }
    }

    fn defer(&self, ctx: ExecutionContext, report: &mut TickReport) {
        let mut deferred = self.deferred.lock();
        match deferred.entry(ctx.job.key.clone()) {
            Entry::Occupied(parked) => {
                warn!(
                    "Job {} is still running; firing scheduled {} coalesced into {}",
                    ctx.job.key,
                    ctx.scheduled_fire_time,
                    parked.get().scheduled_fire_time
                );
                report.coalesced += 1;
            }
            Entry::Vacant(slot) => {
                debug!(
                    "Job {} is still running; deferring firing scheduled {}",
                    ctx.job.key, ctx.scheduled_fire_time
                );
                slot.insert(ctx);
                report.deferred += 1;
            }
        }
    }

    fn apply_completions(&self, report: &mut TickReport) {
        let completions: Vec<Completion> = {
            let mut rx = self.completions.lock();
            std::iter::from_fn(|| rx.try_recv().ok()).collect()
        };

        for completion in completions {
            let failure = completion.outcome.failure();
            if failure.is_some() {
                report.failed += 1;
            } else {
                report.completed += 1;
            }

            let still_open = self
                .dispatcher
                .open_count_for_registration(completion.registration_id)
                > 0;
            let applied = self.registry.with_entry_mut(&completion.job_key, |entry| {
                if entry.trigger.registration_id != completion.registration_id {
                    return false;
                }
                if let Some(data) = &completion.data {
                    entry.definition.data = data.clone();
                }
                entry.trigger.record_completion(failure, still_open);
                true
            });
            match applied {
                Some(true) => {}
                Some(false) => debug!(
                    "Ignoring completion {} of a previous registration of {}",
                    completion.fire_instance_id, completion.job_key
                ),
                None => debug!(
                    "Ignoring completion {} of deleted job {}",
                    completion.fire_instance_id, completion.job_key
                ),
            }
        }
    }

    fn retry_deferred(&self, now: DateTime<Utc>, report: &mut TickReport) {
        let parked: Vec<ExecutionContext> = {
            let mut deferred = self.deferred.lock();
            deferred.drain().map(|(_, ctx)| ctx).collect()
        };

        for parked_ctx in parked {
            let key = parked_ctx.job.key.clone();
            let retried = self.registry.with_entry_mut(&key, |entry| {
                if entry.trigger.registration_id != parked_ctx.trigger.registration_id {
                    debug!("Dropping deferred firing of a previous registration of {}", key);
                    return;
                }
                if entry.trigger.state == TriggerState::Paused {
                    debug!("Dropping deferred firing of paused job {}", key);
                    return;
                }
                // Rebuild so the retry sees data persisted by the run that blocked it.
                let mut ctx = ExecutionContext::new(
                    &entry.definition,
                    &entry.trigger,
                    parked_ctx.scheduled_fire_time,
                    now,
                );
                ctx.off_cycle = parked_ctx.off_cycle;
                self.dispatch(entry, ctx, report);
            });
            if retried.is_none() {
                debug!("Dropping deferred firing of deleted job {}", key);
            }
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
