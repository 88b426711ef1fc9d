//! Tracking repository
//!
//! Handles communication with the experiment-tracking service:
//! - Resolving the experiment of a dataset
//! - Reading back every run of an experiment
//! - Publishing a summary run

use async_trait::async_trait;
use leaderboard_client::TrackingClient;
use leaderboard_core::domain::metrics::{RunRecord, SummaryRecord};
use leaderboard_core::dto::run::{Metric, Param, RunStatus};
use tracing::warn;

use crate::error::Result;

/// Repository trait for tracking-service operations
#[async_trait]
pub trait TrackingRepository: Send + Sync {
    /// Resolves an experiment by name
    ///
    /// # Returns
    /// The experiment ID, or `None` if no experiment has that name
    async fn find_experiment(&self, name: &str) -> Result<Option<String>>;

    /// Lists every active run of an experiment
    async fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>>;

    /// Publishes a summary as a new, finished run
    ///
    /// # Arguments
    /// * `experiment_id` - Experiment receiving the run
    /// * `summary` - The averaged metrics
    /// * `starting_time` - Value of the `starting_time` parameter
    ///
    /// # Returns
    /// The ID of the created run
    async fn publish_summary(
        &self,
        experiment_id: &str,
        summary: &SummaryRecord,
        starting_time: &str,
    ) -> Result<String>;
}

/// HTTP implementation of TrackingRepository
pub struct HttpTrackingRepository {
    client: TrackingClient,
}

impl HttpTrackingRepository {
    /// Creates a new HTTP tracking repository
    ///
    /// # Arguments
    /// * `tracking_uri` - Base URL of the tracking service (e.g., "http://localhost:5000")
    pub fn new(tracking_uri: &str) -> Self {
        Self {
            client: TrackingClient::new(tracking_uri),
        }
    }
}

#[async_trait]
impl TrackingRepository for HttpTrackingRepository {
    async fn find_experiment(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_experiment_by_name(name).await {
            Ok(experiment) => Ok(Some(experiment.experiment_id)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let runs = self.client.list_runs(experiment_id).await?;
        Ok(runs.into_iter().map(RunRecord::from).collect())
    }

    async fn publish_summary(
        &self,
        experiment_id: &str,
        summary: &SummaryRecord,
        starting_time: &str,
    ) -> Result<String> {
        let now = chrono::Utc::now().timestamp_millis();
        let run = self
            .client
            .create_run(experiment_id, &summary.run_name, now)
            .await?;
        let run_id = run.info.run_id;

        let params = summary
            .params(starting_time)
            .into_iter()
            .map(|(key, value)| Param { key, value })
            .collect();
        let metrics = summary
            .metrics()
            .into_iter()
            .map(|(key, value)| Metric {
                key,
                value,
                timestamp: now,
                step: 0,
            })
            .collect();

        if let Err(e) = self.client.log_batch(&run_id, params, metrics).await {
            mark_failed(&self.client, &run_id).await;
            return Err(e.into());
        }

        self.client
            .update_run(&run_id, RunStatus::Finished, chrono::Utc::now().timestamp_millis())
            .await?;

        Ok(run_id)
    }
}

async fn mark_failed(client: &TrackingClient, run_id: &str) {
    let end_time = chrono::Utc::now().timestamp_millis();
    if let Err(e) = client.update_run(run_id, RunStatus::Failed, end_time).await {
        warn!("Failed to mark summary run {} as failed: {}", run_id, e);
    }
}
