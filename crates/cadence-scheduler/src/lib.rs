//! # Cadence Scheduler
//!
//! In-process job scheduling core.
//!
//! ## Features
//!
//! - Interval schedules with finite or infinite repeats
//! - Seconds-resolution cron schedules with misfire policies
//! - Bounded worker pool with per-job non-concurrency
//! - Pause, resume, reschedule and run-now while the engine is ticking
//! - Job data persisted between executions on request
//!
//! ## Wiring
//!
//! ```ignore
//! let registry = Arc::new(JobRegistry::new());
//! let engine = Arc::new(SchedulerEngine::new(registry, EngineConfig::default()));
//! let admin = JobAdmin::new(engine.clone());
//! tokio::spawn(engine.run(shutdown_rx));
//! ```

pub mod admin;
pub mod catalog;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod job;
pub mod key;
pub mod registry;
pub mod schedule;
pub mod trigger;

pub use admin::{JobAdmin, JobSummary, RunningJob};
pub use catalog::JobCatalog;
pub use dispatcher::{Completion, ExecutionDispatcher, ExecutionOutcome, SubmitOutcome};
pub use engine::{EngineConfig, SchedulerEngine, TickReport};
pub use error::{JobError, Result, SchedulerError};
pub use job::{ExecutionContext, FnJob, Job, JobDataMap, JobDefinition, job_fn};
pub use key::{JobKey, TriggerKey};
pub use registry::{JobRegistry, RegisteredJob};
pub use schedule::{CronExpression, MisfirePolicy, RepeatCount, Schedule};
pub use trigger::{Firing, Trigger, TriggerState};
