//! Experiment endpoints

use crate::TrackingClient;
use crate::error::Result;
use leaderboard_core::dto::experiment::{Experiment, GetExperimentResponse};

impl TrackingClient {
    /// Look up an experiment by its name
    ///
    /// # Returns
    /// The experiment, or [`crate::ClientError::NotFound`] if none has that name
    pub async fn get_experiment_by_name(&self, name: &str) -> Result<Experiment> {
        let url = self.endpoint("experiments/get-by-name");
        let response = self
            .client
            .get(&url)
            .query(&[("experiment_name", name)])
            .send()
            .await?;

        let body: GetExperimentResponse = self.handle_response(response).await?;
        Ok(body.experiment)
    }
}
