//! Experiment DTOs

use serde::{Deserialize, Serialize};

/// An experiment; one exists per dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub lifecycle_stage: Option<String>,
}

/// Response of `experiments/get-by-name`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetExperimentResponse {
    pub experiment: Experiment,
}
