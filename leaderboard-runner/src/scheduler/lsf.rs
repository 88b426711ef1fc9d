//! LSF scheduler adapter
//!
//! Runs `bsub` to submit jobs and `bjobs` to list active ones. Both outputs
//! are plain text; the positional assumptions about them live in
//! [`parse_submission_output`] and [`parse_active_jobs`] and nowhere else.

use async_trait::async_trait;
use leaderboard_core::domain::job::{JobHandle, SubmissionCommand};
use std::collections::HashSet;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use super::Scheduler;
use crate::error::{LeaderboardError, Result};

/// Message `bjobs` prints when the user has no active job
const NO_UNFINISHED_JOBS: &str = "No unfinished job found";

/// Scheduler backed by the LSF command-line tools
#[derive(Debug, Clone)]
pub struct LsfScheduler {
    status_program: String,
    status_args: Vec<String>,
    submit_timeout: Duration,
    status_timeout: Duration,
}

impl LsfScheduler {
    /// Creates a new LSF adapter
    ///
    /// # Arguments
    /// * `submit_timeout` - How long `bsub` may take to acknowledge a job
    /// * `status_timeout` - How long one `bjobs` query may take
    pub fn new(submit_timeout: Duration, status_timeout: Duration) -> Self {
        Self {
            status_program: "bjobs".to_string(),
            status_args: Vec::new(),
            submit_timeout,
            status_timeout,
        }
    }

    /// Replaces the active-jobs query
    #[cfg(test)]
    fn with_status_command(mut self, program: &str, args: &[&str]) -> Self {
        self.status_program = program.to_string();
        self.status_args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    async fn run(command: &mut Command, limit: Duration) -> Option<std::io::Result<Output>> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tokio::time::timeout(limit, command.output()).await.ok()
    }
}

#[async_trait]
impl Scheduler for LsfScheduler {
    async fn submit(&self, submission: &SubmissionCommand) -> Result<JobHandle> {
        let mut command = Command::new(&submission.program);
        command.args(&submission.args);

        let output = match Self::run(&mut command, self.submit_timeout).await {
            None => {
                return Err(LeaderboardError::SubmissionTimeout {
                    command: submission.to_string(),
                    timeout: self.submit_timeout,
                });
            }
            Some(Err(e)) => {
                return Err(LeaderboardError::SchedulerCommand {
                    command: submission.program.clone(),
                    message: e.to_string(),
                });
            }
            Some(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !stderr.trim().is_empty() {
            debug!("{} stderr: {}", submission.program, stderr.trim());
        }

        if !output.status.success() {
            return Err(LeaderboardError::SchedulerCommand {
                command: submission.program.clone(),
                message: format!(
                    "exit_code={}, stdout='{}', stderr='{}'",
                    output.status.code().unwrap_or(-1),
                    stdout.trim(),
                    stderr.trim()
                ),
            });
        }

        parse_submission_output(&stdout)
    }

    async fn active_jobs(&self) -> Result<HashSet<JobHandle>> {
        let mut command = Command::new(&self.status_program);
        command.args(&self.status_args);

        let output = match Self::run(&mut command, self.status_timeout).await {
            None => {
                return Err(LeaderboardError::SchedulerCommand {
                    command: self.status_program.clone(),
                    message: format!("timed out after {:?}", self.status_timeout),
                });
            }
            Some(Err(e)) => {
                return Err(LeaderboardError::SchedulerCommand {
                    command: self.status_program.clone(),
                    message: e.to_string(),
                });
            }
            Some(Ok(output)) => output,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if stdout.contains(NO_UNFINISHED_JOBS) || stderr.contains(NO_UNFINISHED_JOBS) {
            return Ok(HashSet::new());
        }

        if !output.status.success() {
            return Err(LeaderboardError::SchedulerCommand {
                command: self.status_program.clone(),
                message: format!(
                    "exit_code={}, stderr='{}'",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            });
        }

        Ok(parse_active_jobs(&stdout))
    }
}

/// Extracts the job handle from a submission acknowledgment
///
/// Expected shape: `Job <12345> is submitted to queue <normal>.` The second
/// whitespace-delimited token must be wrapped in `<` `>`; the handle is what
/// lies between them.
pub fn parse_submission_output(stdout: &str) -> Result<JobHandle> {
    let parse_error = || LeaderboardError::SubmissionParse {
        output: stdout.to_string(),
    };

    let token = stdout.split_whitespace().nth(1).ok_or_else(parse_error)?;
    let id = token
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .filter(|id| !id.is_empty())
        .ok_or_else(parse_error)?;

    Ok(JobHandle::new(id))
}

/// Extracts active job handles from a status listing
///
/// The first line is a header; every following non-empty line starts with
/// the job's identifier.
pub fn parse_active_jobs(stdout: &str) -> HashSet<JobHandle> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(JobHandle::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_submission_output() {
        let handle =
            parse_submission_output("Job <48213> is submitted to queue <gpu_normal>.\n").unwrap();
        assert_eq!(handle, JobHandle::new("48213"));
    }

    #[test]
    fn test_parse_submission_output_rejects_unexpected_shape() {
        for output in [
            "",
            "Job",
            "Job 48213 is submitted",
            "Job <> is submitted",
            "Job <48213 is submitted",
            "Request aborted by esub. Job not submitted.",
        ] {
            let err = parse_submission_output(output).unwrap_err();
            assert!(
                matches!(err, LeaderboardError::SubmissionParse { .. }),
                "{:?} should not parse",
                output
            );
        }
    }

    #[test]
    fn test_parse_active_jobs_skips_header() {
        let listing = "\
JOBID   USER    STAT  QUEUE      FROM_HOST   EXEC_HOST   JOB_NAME   SUBMIT_TIME
48213   eval    RUN   gpu_normal login01     gpu07       python     Oct 19 10:02
48214   eval    PEND  gpu_normal login01                 python     Oct 19 10:02

";
        let active = parse_active_jobs(listing);
        assert_eq!(active.len(), 2);
        assert!(active.contains(&JobHandle::new("48213")));
        assert!(active.contains(&JobHandle::new("48214")));
        assert!(!active.contains(&JobHandle::new("JOBID")));
    }

    #[test]
    fn test_parse_active_jobs_empty_listing() {
        assert!(parse_active_jobs("").is_empty());
        assert!(parse_active_jobs("JOBID USER STAT\n").is_empty());
    }

    #[tokio::test]
    async fn test_missing_scheduler_binary_is_command_error() {
        let scheduler = LsfScheduler::new(Duration::from_secs(4), Duration::from_secs(4));
        let command = SubmissionCommand {
            program: "leaderboard-no-such-bsub".to_string(),
            args: vec![],
        };

        let err = scheduler.submit(&command).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::SchedulerCommand { .. }));
    }

    fn shell(script: &str) -> SubmissionCommand {
        SubmissionCommand {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[tokio::test]
    async fn test_submit_reads_handle_from_stdout() {
        let scheduler = LsfScheduler::new(Duration::from_secs(4), Duration::from_secs(4));
        let handle = scheduler
            .submit(&shell("echo 'Job <77> is submitted to queue <normal>.'"))
            .await
            .unwrap();
        assert_eq!(handle, JobHandle::new("77"));
    }

    #[tokio::test]
    async fn test_submit_times_out() {
        let scheduler = LsfScheduler::new(Duration::from_millis(100), Duration::from_secs(4));
        let err = scheduler.submit(&shell("sleep 5")).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::SubmissionTimeout { .. }));
    }

    #[tokio::test]
    async fn test_submit_non_zero_exit_is_command_error() {
        let scheduler = LsfScheduler::new(Duration::from_secs(4), Duration::from_secs(4));
        let err = scheduler
            .submit(&shell("echo 'Bad resource requirement syntax' >&2; exit 255"))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaderboardError::SchedulerCommand { .. }));
    }

    fn status_query(script: &str) -> LsfScheduler {
        LsfScheduler::new(Duration::from_secs(4), Duration::from_secs(4))
            .with_status_command("sh", &["-c", script])
    }

    #[tokio::test]
    async fn test_no_unfinished_jobs_is_empty_set_at_any_exit_status() {
        let scheduler = status_query("echo 'No unfinished job found' >&2; exit 255");
        assert!(scheduler.active_jobs().await.unwrap().is_empty());

        let scheduler = status_query("echo 'No unfinished job found'");
        assert!(scheduler.active_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_header_only_listing_is_empty_set() {
        let scheduler = status_query("echo 'JOBID   USER    STAT  QUEUE'");
        assert!(scheduler.active_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_jobs_reads_listing() {
        let scheduler = status_query(
            "printf 'JOBID USER STAT\\n48213 eval RUN\\n48214 eval PEND\\n'",
        );
        let active = scheduler.active_jobs().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.contains(&JobHandle::new("48213")));
        assert!(active.contains(&JobHandle::new("48214")));
    }

    #[tokio::test]
    async fn test_status_query_failure_is_command_error() {
        let scheduler = status_query("echo 'LSF is down. Please wait' >&2; exit 255");
        let err = scheduler.active_jobs().await.unwrap_err();
        assert!(matches!(
            err,
            LeaderboardError::SchedulerCommand { ref message, .. } if message.contains("exit_code=255")
        ));
    }

    #[tokio::test]
    async fn test_status_query_times_out() {
        let scheduler = LsfScheduler::new(Duration::from_secs(4), Duration::from_millis(100))
            .with_status_command("sh", &["-c", "sleep 5"]);
        let err = scheduler.active_jobs().await.unwrap_err();
        assert!(matches!(
            err,
            LeaderboardError::SchedulerCommand { ref message, .. } if message.contains("timed out")
        ));
    }
}
