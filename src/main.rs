//! Cadence - cron and interval job scheduler
//!
//! Main entry point for the Cadence CLI.

mod bootstrap;
mod cli;
mod jobs;
mod pipeline;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cadence_config::{Config, ConfigError, ConfigLoader, ConfigValidator, LoggingConfig};
use cadence_deadletter::MemoryRecordSource;
use cadence_scheduler::{JobAdmin, JobRegistry, SchedulerEngine};

use crate::cli::{Cli, Commands};

/// Grace period for open executions after shutdown is requested.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn log_directory(config: &LoggingConfig) -> PathBuf {
    match &config.directory {
        Some(dir) => PathBuf::from(ConfigLoader::expand_path(dir)),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cadence")
            .join("logs"),
    }
}

fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = log_directory(config);
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("cadence")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Flushes the file writer on exit.
    static GUARD: OnceLock<WorkerGuard> = OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Load the config file, falling back to defaults when it does not exist.
fn load_config(path: &Path) -> Result<(Config, bool), ConfigError> {
    match ConfigLoader::load(path) {
        Ok(config) => Ok((config, true)),
        Err(ConfigError::NotFound(_)) => Ok((Config::default(), false)),
        Err(e) => Err(e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (config, found) = load_config(&cli.config)?;

    init_tracing(&config.logging)?;
    if !found {
        warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
    }

    match cli.command {
        None | Some(Commands::Run) => run_scheduler(config).await,
        Some(Commands::Check { format }) => check_config(&config, &format),
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let warnings = ConfigValidator::validate(config)?.into_result()?;
    for warning in warnings {
        warn!("{}: {}", warning.path, warning.message);
    }
    Ok(())
}

/// Validate the configuration and register its jobs on a scratch engine.
fn check_config(config: &Config, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    validate(config)?;

    let registry = Arc::new(JobRegistry::new());
    let engine = Arc::new(SchedulerEngine::new(
        registry,
        bootstrap::engine_config(&config.scheduler),
    ));
    let admin = Arc::new(JobAdmin::new(engine));
    let events = Arc::new(MemoryRecordSource::new(pipeline::EVENTS_TOPIC));
    let catalog = jobs::builtin_catalog(&admin, &events);
    bootstrap::register_jobs(&admin, &catalog, &config.scheduler.jobs)?;

    let jobs = admin.query_all_jobs();
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }

    println!("Configuration OK: {} jobs", jobs.len());
    if !jobs.is_empty() {
        println!();
        println!("{:<30} {:<24} {:<10} NEXT FIRE", "JOB", "SCHEDULE", "STATUS");
        println!("{}", "-".repeat(90));
        for job in &jobs {
            println!(
                "{:<30} {:<24} {:<10} {}",
                format!("{}.{}", job.job_group, job.job_name),
                job.job_time,
                format!("{:?}", job.job_status),
                job.next_fire_time
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string())
            );
        }
    }
    Ok(())
}

/// Run the scheduler in foreground until Ctrl+C.
async fn run_scheduler(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Cadence v{}", env!("CARGO_PKG_VERSION"));
    validate(&config)?;

    let registry = Arc::new(JobRegistry::new());
    let engine = Arc::new(SchedulerEngine::new(
        registry,
        bootstrap::engine_config(&config.scheduler),
    ));
    let admin = Arc::new(JobAdmin::new(engine.clone()));

    let events = Arc::new(MemoryRecordSource::new(pipeline::EVENTS_TOPIC));
    let catalog = jobs::builtin_catalog(&admin, &events);
    info!("Executables available: {}", catalog.ids().join(", "));
    bootstrap::register_jobs(&admin, &catalog, &config.scheduler.jobs)?;

    let consumer = Arc::new(pipeline::event_consumer(
        &config.dead_letter,
        events,
        Arc::new(pipeline::LogRecordSink),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let engine_handle = tokio::spawn(engine.clone().run(shutdown_rx.clone()));
    let consumer_handle = tokio::spawn(consumer.run(shutdown_rx));

    info!("Press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = engine_handle.await {
        error!("Scheduler task failed: {}", e);
    }
    if !engine.dispatcher().wait_idle(SHUTDOWN_GRACE).await {
        warn!(
            "{} executions still open after {:?}",
            engine.dispatcher().open_total(),
            SHUTDOWN_GRACE
        );
    }
    if let Err(e) = consumer_handle.await {
        error!("Dead-letter consumer task failed: {}", e);
    }

    info!("Cadence stopped");
    Ok(())
}
