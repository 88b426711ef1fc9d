//! Run endpoints

use crate::TrackingClient;
use crate::error::Result;
use leaderboard_core::dto::run::{
    CreateRun, CreateRunResponse, LogBatch, Metric, Param, Run, RunStatus, SearchRuns,
    SearchRunsResponse, UpdateRun, ViewType,
};
use tracing::debug;

/// Page size used when enumerating an experiment's runs
const SEARCH_PAGE_SIZE: u32 = 1000;

/// Most params and metrics combined the service accepts in one `log-batch` call
const MAX_ENTITIES_PER_BATCH: usize = 1000;

impl TrackingClient {
    // =============================================================================
    // Run Query
    // =============================================================================

    /// Fetch one page of active runs of an experiment
    pub async fn search_runs(
        &self,
        experiment_id: &str,
        page_token: Option<String>,
    ) -> Result<SearchRunsResponse> {
        let url = self.endpoint("runs/search");
        let response = self
            .client
            .post(&url)
            .json(&SearchRuns {
                experiment_ids: vec![experiment_id.to_string()],
                run_view_type: ViewType::ActiveOnly,
                max_results: SEARCH_PAGE_SIZE,
                page_token,
            })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List every active run of an experiment, following pagination
    pub async fn list_runs(&self, experiment_id: &str) -> Result<Vec<Run>> {
        let mut runs = Vec::new();
        let mut page_token = None;

        loop {
            let page = self.search_runs(experiment_id, page_token).await?;
            debug!(
                "Fetched {} run(s) from experiment {}",
                page.runs.len(),
                experiment_id
            );
            runs.extend(page.runs);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(runs)
    }

    // =============================================================================
    // Run Lifecycle
    // =============================================================================

    /// Create a run in an experiment
    ///
    /// # Arguments
    /// * `experiment_id` - The owning experiment
    /// * `run_name` - Display name of the run
    /// * `start_time` - Start time in milliseconds since the epoch
    pub async fn create_run(
        &self,
        experiment_id: &str,
        run_name: &str,
        start_time: i64,
    ) -> Result<Run> {
        let url = self.endpoint("runs/create");
        let response = self
            .client
            .post(&url)
            .json(&CreateRun {
                experiment_id: experiment_id.to_string(),
                run_name: run_name.to_string(),
                start_time,
            })
            .send()
            .await?;

        let body: CreateRunResponse = self.handle_response(response).await?;
        Ok(body.run)
    }

    /// Log params and metrics to a run
    ///
    /// Params go out with the first request; metrics are split so no request
    /// carries more than [`MAX_ENTITIES_PER_BATCH`] entities in total.
    pub async fn log_batch(
        &self,
        run_id: &str,
        params: Vec<Param>,
        metrics: Vec<Metric>,
    ) -> Result<()> {
        let url = self.endpoint("runs/log-batch");
        for batch in split_batches(run_id, params, metrics) {
            debug!(
                "Logging {} param(s) and {} metric(s) to run {}",
                batch.params.len(),
                batch.metrics.len(),
                run_id
            );
            let response = self.client.post(&url).json(&batch).send().await?;
            self.handle_empty_response(response).await?;
        }

        Ok(())
    }

    /// Mark a run as terminated with the given status
    pub async fn update_run(&self, run_id: &str, status: RunStatus, end_time: i64) -> Result<()> {
        let url = self.endpoint("runs/update");
        let response = self
            .client
            .post(&url)
            .json(&UpdateRun {
                run_id: run_id.to_string(),
                status,
                end_time,
            })
            .send()
            .await?;

        self.handle_empty_response(response).await
    }
}

/// Splits params and metrics into `log-batch` requests within the entity cap
fn split_batches(run_id: &str, params: Vec<Param>, mut metrics: Vec<Metric>) -> Vec<LogBatch> {
    let first_len = MAX_ENTITIES_PER_BATCH
        .saturating_sub(params.len())
        .min(metrics.len());
    let rest = metrics.split_off(first_len);

    let mut batches = vec![LogBatch {
        run_id: run_id.to_string(),
        metrics,
        params,
    }];
    batches.extend(rest.chunks(MAX_ENTITIES_PER_BATCH).map(|chunk| LogBatch {
        run_id: run_id.to_string(),
        metrics: chunk.to_vec(),
        params: Vec::new(),
    }));
    batches
}
