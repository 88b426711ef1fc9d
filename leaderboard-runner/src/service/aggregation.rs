//! Metrics aggregation service
//!
//! Reads every run of a dataset's experiment back from the tracking
//! service, keeps the runs whose base name is the configured run name,
//! and publishes the mean and population variance of their test metrics
//! as a `<run_name>_av` run.

use leaderboard_core::domain::metrics::{KeyPolicy, RunFamily, SummaryRecord};
use std::sync::Arc;

use crate::context::PipelineContext;
use crate::error::{LeaderboardError, Result};
use crate::repository::TrackingRepository;

/// Builds and publishes per-dataset summaries
pub struct MetricsAggregator {
    repository: Arc<dyn TrackingRepository>,
    key_policy: KeyPolicy,
}

impl MetricsAggregator {
    pub fn new(repository: Arc<dyn TrackingRepository>, key_policy: KeyPolicy) -> Self {
        Self {
            repository,
            key_policy,
        }
    }

    /// Summarizes the run family of `run_name` in the `dataset_type` experiment
    ///
    /// Fails with [`LeaderboardError::NoMatchingRuns`] when the family is
    /// empty; nothing is published in that case.
    pub async fn aggregate(
        &self,
        dataset_type: &str,
        run_name: &str,
        context: &PipelineContext,
    ) -> Result<SummaryRecord> {
        let experiment_id = self
            .repository
            .find_experiment(dataset_type)
            .await?
            .ok_or_else(|| LeaderboardError::ExperimentNotFound(dataset_type.to_string()))?;

        let runs = self.repository.list_runs(&experiment_id).await?;
        context.log_debug(format!(
            "Experiment {} ({}) holds {} run(s)",
            dataset_type,
            experiment_id,
            runs.len()
        ));

        let family = RunFamily::collect(run_name, runs);
        if family.unnamed_runs > 0 {
            context.log_warning(format!(
                "Skipped {} run(s) without a run_name parameter",
                family.unnamed_runs
            ));
        }

        let summary = family.summarize(self.key_policy).ok_or_else(|| {
            LeaderboardError::NoMatchingRuns {
                dataset_type: dataset_type.to_string(),
                run_name: run_name.to_string(),
            }
        })?;

        if summary.means.is_empty() {
            context.log_warning(format!(
                "Runs of {} report no test metrics; publishing an empty summary",
                run_name
            ));
        }

        let starting_time = chrono::Local::now()
            .naive_local()
            .format("%Y-%m-%dT%H:%M:%S%.6f")
            .to_string();
        let run_id = self
            .repository
            .publish_summary(&experiment_id, &summary, &starting_time)
            .await?;

        context.log_info(format!(
            "Published {} (run {}) averaging {} run(s) of model {} with key policy {}",
            summary.run_name, run_id, summary.run_count, summary.model_name, self.key_policy
        ));

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTracking, trainer_run};

    fn three_runs() -> Vec<leaderboard_core::domain::metrics::RunRecord> {
        vec![
            trainer_run("a", "exp1_b_0", Some("odometry_net"), &[("test_a", 1.0), ("test_b", 10.0), ("train_loss", 0.9)]),
            trainer_run("b", "exp1_b_1", None, &[("test_a", 2.0), ("test_b", 20.0), ("train_loss", 0.8)]),
            trainer_run("c", "exp1_b_2", None, &[("test_a", 3.0), ("test_b", 30.0), ("train_loss", 0.7)]),
            trainer_run("d", "exp10_b_0", None, &[("test_a", 100.0)]),
        ]
    }

    #[tokio::test]
    async fn test_aggregate_publishes_summary() {
        let tracking = Arc::new(FakeTracking::new().with_experiment("tum", "11", three_runs()));
        let aggregator = MetricsAggregator::new(tracking.clone(), KeyPolicy::FirstSeen);
        let context = PipelineContext::in_memory("tum");

        let summary = aggregator.aggregate("tum", "exp1", &context).await.unwrap();

        assert_eq!(summary.run_name, "exp1_av");
        assert_eq!(summary.run_count, 3);
        assert_eq!(summary.model_name, "odometry_net");
        assert_eq!(summary.means["test_a"], 2.0);
        assert!((summary.variances["test_a"] - 0.6667).abs() < 1e-3);
        assert_eq!(summary.means["test_b"], 20.0);
        assert!((summary.variances["test_b"] - 66.67).abs() < 1e-2);
        assert!(!summary.means.contains_key("train_loss"));

        let published = tracking.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "11");
        assert_eq!(published[0].1, summary);
        assert!(published[0].2.contains('T'));
    }

    #[tokio::test]
    async fn test_no_matching_runs_publishes_nothing() {
        let tracking = Arc::new(FakeTracking::new().with_experiment("tum", "11", three_runs()));
        let aggregator = MetricsAggregator::new(tracking.clone(), KeyPolicy::FirstSeen);
        let context = PipelineContext::in_memory("tum");

        let err = aggregator.aggregate("tum", "exp", &context).await.unwrap_err();

        assert!(matches!(err, LeaderboardError::NoMatchingRuns { .. }));
        assert!(tracking.published().is_empty());
    }

    #[tokio::test]
    async fn test_missing_experiment() {
        let tracking = Arc::new(FakeTracking::new());
        let aggregator = MetricsAggregator::new(tracking.clone(), KeyPolicy::FirstSeen);
        let context = PipelineContext::in_memory("tum");

        let err = aggregator.aggregate("tum", "exp1", &context).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::ExperimentNotFound(_)));
    }

    #[tokio::test]
    async fn test_key_policy_controls_late_metrics() {
        let runs = vec![
            trainer_run("a", "exp1_b_0", None, &[("test_a", 1.0)]),
            trainer_run("b", "exp1_b_1", None, &[("test_a", 3.0), ("test_late", 5.0)]),
        ];

        let first_seen = MetricsAggregator::new(
            Arc::new(FakeTracking::new().with_experiment("tum", "1", runs.clone())),
            KeyPolicy::FirstSeen,
        );
        let union = MetricsAggregator::new(
            Arc::new(FakeTracking::new().with_experiment("tum", "1", runs)),
            KeyPolicy::Union,
        );
        let context = PipelineContext::in_memory("tum");

        let summary = first_seen.aggregate("tum", "exp1", &context).await.unwrap();
        assert!(!summary.means.contains_key("test_late"));
        assert_eq!(summary.model_name, "Unknown");

        let summary = union.aggregate("tum", "exp1", &context).await.unwrap();
        assert_eq!(summary.means["test_late"], 5.0);
        assert_eq!(summary.variances["test_late"], 0.0);
    }
}
