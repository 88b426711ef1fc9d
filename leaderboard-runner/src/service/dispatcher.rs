//! Dataset dispatcher
//!
//! Runs one pipeline per dataset: submit the bundle, wait for it, then
//! publish the summary. In leaderboard mode the pipelines run concurrently,
//! one task per dataset; a dataset whose aggregation fails (or whose task
//! panics) is recorded in the report and never disturbs its siblings.

use leaderboard_core::domain::dataset::{DatasetRegistry, DatasetSelection};
use leaderboard_core::domain::log::LogLevel;
use leaderboard_core::domain::metrics::SummaryRecord;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::MetricsAggregator;
use crate::context::PipelineContext;
use crate::error::{LeaderboardError, Result};
use crate::scheduler::BundleTracker;

/// How one dataset pipeline ended
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetOutcome {
    /// Bundle finished and the summary was published
    Published(SummaryRecord),
    /// Bundle finished but no summary was produced
    AggregationFailed(String),
    /// Submission or tracking failed; the summary was never attempted
    BundleFailed(String),
    /// The pipeline task panicked
    Panicked(String),
}

impl DatasetOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// One dataset's pipeline after it ended
#[derive(Debug, Clone)]
pub struct DatasetRun {
    pub outcome: DatasetOutcome,
    /// `None` when the pipeline never got a context
    pub pipeline_id: Option<Uuid>,
    pub log_path: Option<PathBuf>,
    /// Warnings and errors the pipeline logged, oldest first
    pub issues: Vec<String>,
}

impl DatasetRun {
    fn from_context(context: &PipelineContext, outcome: DatasetOutcome) -> Self {
        let issues = context
            .entries()
            .into_iter()
            .filter(|entry| matches!(entry.level, LogLevel::Warning | LogLevel::Error))
            .map(|entry| entry.message)
            .collect();

        Self {
            outcome,
            pipeline_id: Some(context.pipeline_id()),
            log_path: context.log_path().map(Path::to_path_buf),
            issues,
        }
    }

    fn without_context(outcome: DatasetOutcome) -> Self {
        Self {
            outcome,
            pipeline_id: None,
            log_path: None,
            issues: Vec::new(),
        }
    }
}

/// Outcome of every dispatched dataset
#[derive(Debug, Default)]
pub struct DispatchReport {
    runs: BTreeMap<String, DatasetRun>,
}

impl DispatchReport {
    fn record(&mut self, dataset_type: String, run: DatasetRun) {
        self.runs.insert(dataset_type, run);
    }

    pub fn get(&self, dataset_type: &str) -> Option<&DatasetRun> {
        self.runs.get(dataset_type)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn published_count(&self) -> usize {
        self.runs.values().filter(|r| r.outcome.is_published()).count()
    }
}

/// A finished pipeline and the error that ended its bundle, if any
struct PipelineResult {
    run: DatasetRun,
    bundle_error: Option<LeaderboardError>,
}

/// Runs dataset pipelines
#[derive(Clone)]
pub struct DatasetDispatcher {
    tracker: Arc<BundleTracker>,
    aggregator: Arc<MetricsAggregator>,
    datasets: DatasetRegistry,
    bundle_size: usize,
    /// Per-dataset log files go here; `None` keeps logs in memory only
    log_dir: Option<PathBuf>,
    max_parallel: Option<usize>,
    cancel: CancellationToken,
}

impl DatasetDispatcher {
    pub fn new(
        tracker: Arc<BundleTracker>,
        aggregator: Arc<MetricsAggregator>,
        datasets: DatasetRegistry,
        bundle_size: usize,
    ) -> Self {
        Self {
            tracker,
            aggregator,
            datasets,
            bundle_size,
            log_dir: None,
            max_parallel: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_log_dir(mut self, log_dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(log_dir.into());
        self
    }

    /// Caps how many dataset pipelines run at once
    pub fn with_max_parallel(mut self, max_parallel: Option<usize>) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Token that stops every pipeline still polling
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the pipelines of the selected datasets
    ///
    /// Every dataset is checked against the registry before anything is
    /// submitted. A single dataset runs inline and a bundle failure is
    /// returned as an error; in leaderboard mode every failure stays in the
    /// report.
    pub async fn dispatch(&self, selection: &DatasetSelection) -> Result<DispatchReport> {
        let datasets = selection.datasets();
        for dataset in &datasets {
            if !self.datasets.contains(dataset) {
                return Err(LeaderboardError::config(format!(
                    "Unknown dataset_type '{}'",
                    dataset
                )));
            }
        }

        match selection {
            DatasetSelection::Single(dataset) => {
                let result = self.run_pipeline(dataset).await?;
                if let Some(e) = result.bundle_error {
                    return Err(e);
                }
                let mut report = DispatchReport::default();
                report.record(dataset.clone(), result.run);
                Ok(report)
            }
            DatasetSelection::Leaderboard => Ok(self.dispatch_all(datasets).await),
        }
    }

    async fn dispatch_all(&self, datasets: Vec<String>) -> DispatchReport {
        let permits = self.max_parallel.unwrap_or(datasets.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut handles = Vec::with_capacity(datasets.len());

        for dataset in datasets {
            info!("Submitting {}", dataset);
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let name = dataset.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return DatasetRun::without_context(DatasetOutcome::BundleFailed(
                        "dispatcher shut down".to_string(),
                    ));
                };
                match this.run_pipeline(&name).await {
                    Ok(result) => {
                        if let Some(e) = &result.bundle_error {
                            error!(dataset = %name, "Bundle failed: {}", e);
                        }
                        result.run
                    }
                    Err(e) => {
                        error!(dataset = %name, "Pipeline could not start: {}", e);
                        DatasetRun::without_context(DatasetOutcome::BundleFailed(e.to_string()))
                    }
                }
            });
            handles.push((dataset, handle));
        }

        let mut report = DispatchReport::default();
        for (dataset, handle) in handles {
            let run = match handle.await {
                Ok(run) => run,
                Err(e) => {
                    warn!(dataset = %dataset, "Pipeline task panicked: {}", e);
                    DatasetRun::without_context(DatasetOutcome::Panicked(e.to_string()))
                }
            };
            report.record(dataset, run);
        }
        report
    }

    /// Runs one dataset pipeline in its own logging context
    ///
    /// Only a context that cannot be created is an error here; a bundle
    /// error is handed back next to the run so the caller decides whether it
    /// propagates.
    async fn run_pipeline(&self, dataset_type: &str) -> Result<PipelineResult> {
        let context = match &self.log_dir {
            Some(dir) => PipelineContext::new(dataset_type, dir)?,
            None => PipelineContext::in_memory(dataset_type),
        };

        let (outcome, bundle_error) = match self.execute(&context).await {
            Ok(outcome) => (outcome, None),
            Err(e) => (DatasetOutcome::BundleFailed(e.to_string()), Some(e)),
        };

        Ok(PipelineResult {
            run: DatasetRun::from_context(&context, outcome),
            bundle_error,
        })
    }

    /// Submit, wait, aggregate for the context's dataset
    ///
    /// Aggregation errors are logged and folded into the outcome; everything
    /// before aggregation propagates.
    async fn execute(&self, context: &PipelineContext) -> Result<DatasetOutcome> {
        let dataset_type = context.dataset_type();

        if let Err(e) = self
            .tracker
            .run(dataset_type, self.bundle_size, context, &self.cancel)
            .await
        {
            context.log_error(format!("Dataset {}. {}", dataset_type, e));
            return Err(e);
        }

        context.log_info(format!("Dataset {}. Averaging metrics", dataset_type));
        let outcome = match self
            .aggregator
            .aggregate(dataset_type, self.tracker.run_name(), context)
            .await
        {
            Ok(summary) => DatasetOutcome::Published(summary),
            Err(e) => {
                context.log_error(format!("Dataset {}. {}", dataset_type, e));
                DatasetOutcome::AggregationFailed(e.to_string())
            }
        };

        Ok(outcome)
    }
}
