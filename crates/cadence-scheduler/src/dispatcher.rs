//! Execution dispatcher.
//!
//! Runs accepted firings on a bounded worker pool and reports each finished
//! execution back to the engine over a channel. Jobs that disallow
//! concurrent execution get at most one open execution; further firings are
//! handed back to the caller as deferred.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use tokio::sync::{Notify, Semaphore, mpsc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::error::JobError;
use crate::job::{ExecutionContext, JobDataMap};
use crate::key::JobKey;

/// Result of handing a context to the dispatcher.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Queued for execution on the worker pool.
    Accepted,
    /// Another execution of this non-concurrent job is open. The context is
    /// handed back untouched.
    Deferred(Box<ExecutionContext>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded,
    Failed(String),
}

impl ExecutionOutcome {
    pub fn failure(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Succeeded => None,
            ExecutionOutcome::Failed(message) => Some(message),
        }
    }
}

/// Report of one finished execution.
#[derive(Debug, Clone)]
pub struct Completion {
    pub fire_instance_id: Uuid,
    pub job_key: JobKey,
    /// Registration of the job the execution was fired for.
    pub registration_id: Uuid,
    pub outcome: ExecutionOutcome,
    /// Final data, present only for jobs that persist data.
    pub data: Option<JobDataMap>,
    pub finished_at: DateTime<Utc>,
}

pub struct ExecutionDispatcher {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    running: Arc<DashMap<Uuid, ExecutionContext>>,
    exclusive: Arc<DashMap<JobKey, Uuid>>,
    completions: mpsc::UnboundedSender<Completion>,
    idle: Arc<Notify>,
    total_succeeded: Arc<AtomicU64>,
    total_failed: Arc<AtomicU64>,
}

impl ExecutionDispatcher {
    /// Create a dispatcher with `max_workers` concurrent executions and the
    /// receiving end of its completion channel.
    pub fn new(max_workers: usize) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let max_workers = max_workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            running: Arc::new(DashMap::new()),
            exclusive: Arc::new(DashMap::new()),
            completions: tx,
            idle: Arc::new(Notify::new()),
            total_succeeded: Arc::new(AtomicU64::new(0)),
            total_failed: Arc::new(AtomicU64::new(0)),
        };
        (dispatcher, rx)
    }

    /// Accept a context for execution, or defer it when its job disallows
    /// concurrency and already has an open execution.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, ctx: ExecutionContext) -> SubmitOutcome {
        let exclusive = !ctx.job.allow_concurrent_execution;
        if exclusive {
            match self.exclusive.entry(ctx.job.key.clone()) {
                Entry::Occupied(_) => {
                    debug!(
                        "Deferring {} for {}: execution already open",
                        ctx.fire_instance_id, ctx.job.key
                    );
                    return SubmitOutcome::Deferred(Box::new(ctx));
                }
                Entry::Vacant(slot) => {
                    slot.insert(ctx.fire_instance_id);
                }
            }
        }

        let fire_id = ctx.fire_instance_id;
        self.running.insert(fire_id, ctx.clone());
        debug!(
            "Dispatching {} for {} (scheduled {})",
            fire_id, ctx.job.key, ctx.scheduled_fire_time
        );

        let semaphore = self.semaphore.clone();
        let running = self.running.clone();
        let exclusive_slots = self.exclusive.clone();
        let completions = self.completions.clone();
        let idle = self.idle.clone();
        let total_succeeded = self.total_succeeded.clone();
        let total_failed = self.total_failed.clone();

        tokio::spawn(async move {
            let mut ctx = ctx;
            let outcome = match semaphore.acquire_owned().await {
                Ok(permit) => {
                    let outcome = execute(&mut ctx).await;
                    drop(permit);
                    outcome
                }
                Err(e) => ExecutionOutcome::Failed(JobError::NotStarted(e.to_string()).to_string()),
            };

            match &outcome {
                ExecutionOutcome::Succeeded => {
                    total_succeeded.fetch_add(1, Ordering::SeqCst);
                }
                ExecutionOutcome::Failed(_) => {
                    total_failed.fetch_add(1, Ordering::SeqCst);
                }
            }

            running.remove(&fire_id);
            if exclusive {
                exclusive_slots.remove_if(&ctx.job.key, |_, owner| *owner == fire_id);
            }

            let completion = Completion {
                fire_instance_id: fire_id,
                job_key: ctx.job.key.clone(),
                registration_id: ctx.trigger.registration_id,
                outcome,
                data: ctx.job.persist_data_after_execution.then(|| ctx.data),
                finished_at: Utc::now(),
            };
            if completions.send(completion).is_err() {
                debug!("Completion for {} dropped: engine is gone", fire_id);
            }
            if running.is_empty() {
                idle.notify_waiters();
            }
        });

        SubmitOutcome::Accepted
    }

    /// Contexts currently open (queued for a worker or running), oldest first.
    pub fn list_running(&self) -> Vec<ExecutionContext> {
        let mut contexts: Vec<ExecutionContext> = self
            .running
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        contexts.sort_by_key(|ctx| ctx.actual_fire_time);
        contexts
    }

    /// Number of open contexts for one job.
    pub fn open_count(&self, key: &JobKey) -> usize {
        self.running
            .iter()
            .filter(|entry| &entry.value().job.key == key)
            .count()
    }

    /// Number of open contexts fired for one registration of a job.
    pub fn open_count_for_registration(&self, registration_id: Uuid) -> usize {
        self.running
            .iter()
            .filter(|entry| entry.value().trigger.registration_id == registration_id)
            .count()
    }

    pub fn open_total(&self) -> usize {
        self.running.len()
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn available_workers(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn total_succeeded(&self) -> u64 {
        self.total_succeeded.load(Ordering::SeqCst)
    }

    pub fn total_failed(&self) -> u64 {
        self.total_failed.load(Ordering::SeqCst)
    }

    /// Stop handing out worker slots. Contexts still waiting for a slot
    /// finish as failed without running.
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Wait until no context is open. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                // Register before checking so a wake-up in between is not lost.
                notified.as_mut().enable();
                if self.running.is_empty() {
                    return;
                }
                notified.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Dispatcher still has {} open executions after {:?}",
                self.running.len(),
                timeout
            );
            return false;
        }
        true
    }
}

/// Run the job body, converting errors and panics into an outcome.
async fn execute(ctx: &mut ExecutionContext) -> ExecutionOutcome {
    let executable = ctx.job.executable.clone();
    let key = ctx.job.key.clone();
    let fire_id = ctx.fire_instance_id;

    match AssertUnwindSafe(executable.execute(ctx)).catch_unwind().await {
        Ok(Ok(())) => {
            debug!("Job {} finished ({})", key, fire_id);
            ExecutionOutcome::Succeeded
        }
        Ok(Err(e)) => {
            error!("Job {} failed ({}): {}", key, fire_id, e);
            ExecutionOutcome::Failed(e.to_string())
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("Job {} panicked ({}): {}", key, fire_id, message);
            ExecutionOutcome::Failed(JobError::Panicked(message).to_string())
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
