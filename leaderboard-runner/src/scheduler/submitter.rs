//! Job submitter
//!
//! Turns a [`JobSpec`] into a scheduler submission and returns the handle
//! the scheduler assigned. Command construction is deterministic and happens
//! before any external call, so an unknown dataset fails without touching
//! the scheduler.

use leaderboard_core::domain::dataset::DatasetRegistry;
use leaderboard_core::domain::job::{JobHandle, JobSpec, SubmissionCommand};
use std::path::PathBuf;
use std::sync::Arc;

use super::Scheduler;
use crate::context::PipelineContext;
use crate::error::{LeaderboardError, Result};

/// GPU request of every evaluation job: one GPU, not shared
pub const EXCLUSIVE_GPU: &str = "num=1:mode=exclusive_process";

/// Everything needed to build a submission besides the job itself
#[derive(Debug, Clone)]
pub struct SubmissionSettings {
    /// Trainer script launched by every job
    pub trainer_path: PathBuf,
    /// Interpreter the trainer runs under
    pub interpreter: String,
    /// Directory receiving job output; `%J` expands to the job ID
    pub output_dir: PathBuf,
    /// Scheduler GPU resource request
    pub gpu_request: String,
    /// Candidate execution hosts, empty for any
    pub hosts: Vec<String>,
}

impl SubmissionSettings {
    pub fn new(trainer_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            trainer_path: trainer_path.into(),
            interpreter: "python".to_string(),
            output_dir: output_dir.into(),
            gpu_request: EXCLUSIVE_GPU.to_string(),
            hosts: Vec::new(),
        }
    }
}

/// Builds and submits evaluation jobs
#[derive(Clone)]
pub struct JobSubmitter {
    scheduler: Arc<dyn Scheduler>,
    datasets: DatasetRegistry,
    settings: SubmissionSettings,
}

impl JobSubmitter {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        datasets: DatasetRegistry,
        settings: SubmissionSettings,
    ) -> Self {
        Self {
            scheduler,
            datasets,
            settings,
        }
    }

    /// Resolves the job for one bundle slot
    ///
    /// Fails with a configuration error if the dataset has no known root.
    pub fn job_spec(&self, dataset_type: &str, run_name: &str, bundle_index: usize) -> Result<JobSpec> {
        let dataset_root = self.datasets.root(dataset_type).ok_or_else(|| {
            LeaderboardError::config(format!("Unknown dataset_type '{}'", dataset_type))
        })?;

        Ok(JobSpec {
            dataset_type: dataset_type.to_string(),
            dataset_root: dataset_root.to_path_buf(),
            run_name: run_name.to_string(),
            bundle_index,
        })
    }

    /// Builds the submission for a job
    pub fn build_command(&self, spec: &JobSpec) -> SubmissionCommand {
        let settings = &self.settings;
        let mut args = vec![
            "-o".to_string(),
            settings.output_dir.join("%J").to_string_lossy().into_owned(),
            "-gpu".to_string(),
            settings.gpu_request.clone(),
        ];

        if !settings.hosts.is_empty() {
            args.push("-m".to_string());
            args.push(settings.hosts.join(" "));
        }

        args.extend([
            settings.interpreter.clone(),
            settings.trainer_path.to_string_lossy().into_owned(),
            "--dataset_root".to_string(),
            spec.dataset_root.to_string_lossy().into_owned(),
            "--dataset_type".to_string(),
            spec.dataset_type.clone(),
            "--run_name".to_string(),
            spec.job_run_name(),
        ]);

        SubmissionCommand {
            program: "bsub".to_string(),
            args,
        }
    }

    /// Submits one job and returns its handle
    ///
    /// The job stays queued even if a later step of the bundle fails.
    pub async fn submit(&self, spec: &JobSpec, context: &PipelineContext) -> Result<JobHandle> {
        let command = self.build_command(spec);
        context.log_info(format!("Running command: {}", command));

        let handle = self.scheduler.submit(&command).await?;
        context.log_debug(format!(
            "Job {} submitted for {}",
            handle,
            spec.job_run_name()
        ));

        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeScheduler;

    fn submitter(scheduler: Arc<FakeScheduler>) -> JobSubmitter {
        let datasets = DatasetRegistry::new().with_dataset("kitti_4/6", "/data/kitti");
        let settings = SubmissionSettings::new("/opt/eval/train.py", "/home/eval/lsf");
        JobSubmitter::new(scheduler, datasets, settings)
    }

    #[test]
    fn test_build_command_is_deterministic() {
        let submitter = submitter(Arc::new(FakeScheduler::new()));
        let spec = submitter.job_spec("kitti_4/6", "exp1", 2).unwrap();

        let command = submitter.build_command(&spec);
        assert_eq!(command, submitter.build_command(&spec));
        assert_eq!(command.program, "bsub");
        assert_eq!(
            command.args,
            vec![
                "-o",
                "/home/eval/lsf/%J",
                "-gpu",
                "num=1:mode=exclusive_process",
                "python",
                "/opt/eval/train.py",
                "--dataset_root",
                "/data/kitti",
                "--dataset_type",
                "kitti_4/6",
                "--run_name",
                "exp1_b_2",
            ]
        );
    }

    #[test]
    fn test_build_command_with_hosts() {
        let mut settings = SubmissionSettings::new("/opt/eval/train.py", "/home/eval/lsf");
        settings.hosts = vec!["gpu01".to_string(), "gpu02".to_string()];
        let submitter = JobSubmitter::new(
            Arc::new(FakeScheduler::new()),
            DatasetRegistry::new().with_dataset("tum", "/data/tum"),
            settings,
        );

        let spec = submitter.job_spec("tum", "exp1", 0).unwrap();
        let command = submitter.build_command(&spec);
        let m = command.args.iter().position(|a| a == "-m").unwrap();
        assert_eq!(command.args[m + 1], "gpu01 gpu02");
    }

    #[test]
    fn test_unknown_dataset_is_configuration_error() {
        let scheduler = Arc::new(FakeScheduler::new());
        let submitter = submitter(Arc::clone(&scheduler));

        let err = submitter.job_spec("imagenet", "exp1", 0).unwrap_err();
        assert!(matches!(err, LeaderboardError::Configuration(_)));
        assert_eq!(scheduler.submissions().len(), 0);
    }

    #[tokio::test]
    async fn test_submit_returns_scheduler_handle() {
        let scheduler = Arc::new(FakeScheduler::new());
        let submitter = submitter(Arc::clone(&scheduler));
        let context = PipelineContext::in_memory("kitti_4/6");

        let spec = submitter.job_spec("kitti_4/6", "exp1", 0).unwrap();
        let handle = submitter.submit(&spec, &context).await.unwrap();

        assert_eq!(handle, JobHandle::new("1000"));
        let submissions = scheduler.submissions();
        assert_eq!(submissions.len(), 1);
        assert!(submissions[0].args.contains(&"exp1_b_0".to_string()));
        assert!(
            context
                .entries()
                .iter()
                .any(|e| e.message.starts_with("Running command: bsub"))
        );
    }
}
