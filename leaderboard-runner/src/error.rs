//! Error types for the runner

use leaderboard_client::ClientError;
use leaderboard_core::domain::job::JobHandle;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, LeaderboardError>;

/// Errors raised while submitting, tracking or summarizing a bundle
#[derive(Debug, Error)]
pub enum LeaderboardError {
    /// Unknown dataset, missing trainer script or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The scheduler did not acknowledge a submission in time
    #[error("Scheduler did not acknowledge submission within {timeout:?}: {command}")]
    SubmissionTimeout { command: String, timeout: Duration },

    /// The submission acknowledgment did not carry a job handle where expected
    #[error("Could not extract job handle from scheduler output: {output:?}")]
    SubmissionParse { output: String },

    /// A scheduler command could not be run or exited with failure
    #[error("Scheduler command '{command}' failed: {message}")]
    SchedulerCommand { command: String, message: String },

    /// Tracked jobs were still active when the polling deadline passed
    #[error("Jobs {remaining:?} still active after {waited:?}")]
    StuckJobs {
        remaining: Vec<JobHandle>,
        waited: Duration,
    },

    /// Polling was cancelled before the bundle finished
    #[error("Bundle tracking cancelled with jobs {remaining:?} still active")]
    Cancelled { remaining: Vec<JobHandle> },

    /// No experiment exists for the dataset
    #[error("No experiment named '{0}'")]
    ExperimentNotFound(String),

    /// No run of the experiment belongs to the requested run family
    #[error("No runs named '{run_name}_b_<index>' in experiment '{dataset_type}'")]
    NoMatchingRuns {
        dataset_type: String,
        run_name: String,
    },

    /// Tracking service request failed
    #[error("Tracking service error: {0}")]
    Tracking(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LeaderboardError {
    /// Shorthand for configuration errors
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
