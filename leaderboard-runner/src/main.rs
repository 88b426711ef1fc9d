//! Leaderboard Runner
//!
//! Evaluates a trained model on one or more benchmark datasets through the
//! batch scheduler and publishes one averaged result per dataset.
//!
//! Architecture:
//! - Configuration: settings from the environment, run parameters from the CLI
//! - Scheduler: job submission and bundle tracking against LSF
//! - Repositories: experiment-tracking service access
//! - Services: metric aggregation and per-dataset dispatch
//!
//! For every dataset a bundle of identical jobs is submitted, the scheduler
//! is polled until the bundle has left the queue, and the metrics the jobs
//! logged are averaged into a `<run_name>_av` run.

mod config;
mod context;
mod error;
mod repository;
mod scheduler;
mod service;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::Parser;
use leaderboard_core::domain::dataset::DatasetSelection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::error::LeaderboardError;
use crate::repository::HttpTrackingRepository;
use crate::scheduler::{BundleTracker, JobSubmitter, LsfScheduler, PollPolicy, SubmissionSettings};
use crate::service::{DatasetDispatcher, DatasetOutcome, MetricsAggregator};

#[derive(Parser)]
#[command(name = "leaderboard")]
#[command(about = "Evaluate a model on the benchmark leaderboard", long_about = None)]
struct Cli {
    /// Trainer script every job runs
    #[arg(long = "trainer-path", alias = "trainer_path")]
    trainer_path: PathBuf,

    /// Dataset to evaluate on, or "leaderboard" for every leaderboard dataset
    #[arg(short = 't', long = "dataset-type", alias = "dataset_type")]
    dataset_type: String,

    /// Name of the run. Must be unique and specific
    #[arg(short = 'n', long = "run-name", alias = "run_name")]
    run_name: String,

    /// Number of runs to average per dataset
    #[arg(
        short = 'b',
        long = "bundle-size",
        alias = "bundle_size",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    bundle_size: u32,

    /// Print debug output to the console
    #[arg(short, long)]
    verbose: bool,

    /// Tracking service URL
    #[arg(long, env = "TRACKING_URI")]
    tracking_uri: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose {
        "leaderboard_runner=debug,leaderboard_client=debug"
    } else {
        "leaderboard_runner=info,leaderboard_client=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting leaderboard run {}", cli.run_name);

    // Load configuration
    let config = load_config(&cli)?;
    info!(
        "Loaded configuration: tracking_uri={}, log_dir={}",
        config.tracking_uri,
        config.log_dir.display()
    );

    if !cli.trainer_path.exists() {
        return Err(LeaderboardError::config(format!(
            "Could not find trainer script {}",
            cli.trainer_path.display()
        ))
        .into());
    }

    let dispatcher = build_dispatcher(&cli, &config);

    let cancel = dispatcher.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling bundle tracking");
            cancel.cancel();
        }
    });

    let selection = DatasetSelection::parse(&cli.dataset_type);
    let report = dispatcher
        .dispatch(&selection)
        .await
        .context("Leaderboard run failed")?;

    for dataset in selection.datasets() {
        let Some(run) = report.get(&dataset) else {
            continue;
        };
        match &run.outcome {
            DatasetOutcome::Published(summary) => info!(
                "{}: published {} over {} run(s)",
                dataset, summary.run_name, summary.run_count
            ),
            DatasetOutcome::AggregationFailed(reason) => {
                warn!("{}: no summary produced: {}", dataset, reason)
            }
            DatasetOutcome::BundleFailed(reason) | DatasetOutcome::Panicked(reason) => {
                error!("{}: bundle failed: {}", dataset, reason)
            }
        }
        if !run.issues.is_empty() {
            warn!("{}: {} warning(s) or error(s) logged", dataset, run.issues.len());
            for issue in &run.issues {
                debug!("{}: {}", dataset, issue);
            }
        }
        if let (Some(pipeline_id), Some(path)) = (run.pipeline_id, &run.log_path) {
            info!("{}: pipeline {} logged to {}", dataset, pipeline_id, path.display());
        }
    }
    info!(
        "{} of {} dataset(s) published a summary",
        report.published_count(),
        report.len()
    );

    Ok(())
}

/// Loads configuration from the environment, letting the CLI supply the tracking URI
fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::from_lookup(|key| match key {
        "TRACKING_URI" => cli.tracking_uri.clone(),
        _ => std::env::var(key).ok(),
    })
    .context("Failed to load configuration")?;
    config.validate()?;
    Ok(config)
}

fn build_dispatcher(cli: &Cli, config: &Config) -> DatasetDispatcher {
    let scheduler = Arc::new(LsfScheduler::new(
        config.submit_timeout,
        config.status_timeout,
    ));

    let mut settings =
        SubmissionSettings::new(cli.trainer_path.clone(), config.scheduler_output_dir.clone());
    settings.interpreter = config.trainer_interpreter.clone();
    settings.hosts = config.scheduler_hosts.clone();

    let submitter = JobSubmitter::new(scheduler.clone(), config.datasets.clone(), settings);
    let tracker = BundleTracker::new(
        submitter,
        scheduler,
        cli.run_name.clone(),
        PollPolicy::new(config.poll_interval, config.max_wait),
    );

    let repository = Arc::new(HttpTrackingRepository::new(&config.tracking_uri));
    let aggregator = MetricsAggregator::new(repository, config.key_policy);

    DatasetDispatcher::new(
        Arc::new(tracker),
        Arc::new(aggregator),
        config.datasets.clone(),
        cli.bundle_size as usize,
    )
    .with_log_dir(config.log_dir.clone())
    .with_max_parallel(config.max_parallel_datasets)
}
