//! Runner configuration
//!
//! Defines the configurable parameters of a leaderboard run: tracking
//! service location, dataset roots, scheduler timeouts and polling cadence.

use leaderboard_core::domain::dataset::DatasetRegistry;
use leaderboard_core::domain::metrics::KeyPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Runner configuration
///
/// All timeouts and intervals are configurable to allow tuning for
/// different clusters (short debug queues vs. long evaluation queues).
#[derive(Debug, Clone)]
pub struct Config {
    /// Tracking service base URL (e.g., "http://localhost:5000")
    pub tracking_uri: String,

    /// Directory receiving the per-dataset log files
    pub log_dir: PathBuf,

    /// Directory the scheduler writes job output into (`<dir>/%J`)
    pub scheduler_output_dir: PathBuf,

    /// Known datasets and their roots
    pub datasets: DatasetRegistry,

    /// How often to query the scheduler for active jobs
    pub poll_interval: Duration,

    /// How long a submission may take to be acknowledged
    pub submit_timeout: Duration,

    /// How long one active-jobs query may take
    pub status_timeout: Duration,

    /// Longest time to wait for a bundle; `None` waits forever
    pub max_wait: Option<Duration>,

    /// Which metric keys survive aggregation
    pub key_policy: KeyPolicy,

    /// Candidate execution hosts passed to the scheduler, if any
    pub scheduler_hosts: Vec<String>,

    /// Max dataset pipelines running at once; defaults to the dataset count
    pub max_parallel_datasets: Option<usize>,

    /// Interpreter the trainer script is launched with
    pub trainer_interpreter: String,
}

impl Config {
    /// Creates a new configuration with defaults
    ///
    /// Scheduler output defaults to `lsf` relative to the working directory;
    /// [`Config::from_lookup`] moves it under `HOME` when that is set.
    pub fn new(tracking_uri: String) -> Self {
        Self {
            tracking_uri,
            log_dir: PathBuf::from("."),
            scheduler_output_dir: PathBuf::from("lsf"),
            datasets: DatasetRegistry::new(),
            poll_interval: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(4),
            status_timeout: Duration::from_secs(30),
            max_wait: Some(Duration::from_secs(48 * 60 * 60)),
            key_policy: KeyPolicy::FirstSeen,
            scheduler_hosts: Vec::new(),
            max_parallel_datasets: None,
            trainer_interpreter: "python".to_string(),
        }
    }

    /// Creates configuration from a variable lookup, usually the process environment
    ///
    /// Expected variables:
    /// - TRACKING_URI (required)
    /// - PROJECT_PATH (optional, log directory, default: current directory)
    /// - HOME (scheduler output goes to $HOME/lsf)
    /// - DISCOMAN_V10_PATH, KITTI_PATH, TUM_PATH (dataset roots)
    /// - POLL_INTERVAL (optional, seconds, default: 10)
    /// - SUBMIT_TIMEOUT (optional, seconds, default: 4)
    /// - STATUS_TIMEOUT (optional, seconds, default: 30)
    /// - MAX_WAIT (optional, seconds, default: 172800, 0 = no limit)
    /// - METRIC_KEY_POLICY (optional, first-seen | union | intersection)
    /// - LSF_HOSTS (optional, comma-separated)
    /// - MAX_PARALLEL_DATASETS (optional)
    /// - TRAINER_INTERPRETER (optional, default: python)
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tracking_uri = lookup("TRACKING_URI")
            .ok_or_else(|| anyhow::anyhow!("TRACKING_URI environment variable not set"))?;

        let mut config = Self::new(tracking_uri);

        if let Some(project) = lookup("PROJECT_PATH") {
            config.log_dir = PathBuf::from(project);
        }

        if let Some(home) = lookup("HOME") {
            config.scheduler_output_dir = PathBuf::from(home).join("lsf");
        }

        config.datasets = DatasetRegistry::from_lookup(&lookup);

        let secs = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        if let Some(interval) = secs("POLL_INTERVAL") {
            config.poll_interval = interval;
        }
        if let Some(timeout) = secs("SUBMIT_TIMEOUT") {
            config.submit_timeout = timeout;
        }
        if let Some(timeout) = secs("STATUS_TIMEOUT") {
            config.status_timeout = timeout;
        }
        if let Some(max_wait) = secs("MAX_WAIT") {
            config.max_wait = (!max_wait.is_zero()).then_some(max_wait);
        }

        if let Some(policy) = lookup("METRIC_KEY_POLICY") {
            config.key_policy = policy.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        }

        if let Some(hosts) = lookup("LSF_HOSTS") {
            config.scheduler_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.max_parallel_datasets = lookup("MAX_PARALLEL_DATASETS")
            .and_then(|s| s.trim().parse::<usize>().ok());

        if let Some(interpreter) = lookup("TRAINER_INTERPRETER").filter(|s| !s.is_empty()) {
            config.trainer_interpreter = interpreter;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tracking_uri.is_empty() {
            anyhow::bail!("tracking_uri cannot be empty");
        }

        if !self.tracking_uri.starts_with("http://") && !self.tracking_uri.starts_with("https://")
        {
            anyhow::bail!("tracking_uri must start with http:// or https://");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.submit_timeout.is_zero() {
            anyhow::bail!("submit_timeout must be greater than 0");
        }

        if self.status_timeout.is_zero() {
            anyhow::bail!("status_timeout must be greater than 0");
        }

        if self.max_parallel_datasets == Some(0) {
            anyhow::bail!("max_parallel_datasets must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:5000".to_string())
    }
}
