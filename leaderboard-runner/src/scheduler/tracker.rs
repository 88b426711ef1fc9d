//! Bundle tracker
//!
//! Submits the jobs of one bundle and then polls the scheduler until none
//! of their handles is active anymore.
//!
//! State machine: `Submitting -> Polling -> Done`. Polling repeats every
//! `interval` while any tracked handle is active. It ends with
//! [`LeaderboardError::StuckJobs`] once `max_wait` has passed, or with
//! [`LeaderboardError::Cancelled`] when the cancellation token fires. A job
//! that failed but left the active set is indistinguishable from one that
//! succeeded.

use leaderboard_core::domain::job::{BundleState, JobHandle};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{JobSubmitter, Scheduler};
use crate::context::PipelineContext;
use crate::error::{LeaderboardError, Result};

/// How the tracker polls the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two active-jobs queries
    pub interval: Duration,
    /// Longest total wait; `None` waits until the jobs leave or cancellation
    pub max_wait: Option<Duration>,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_wait: Option<Duration>) -> Self {
        Self { interval, max_wait }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), None)
    }
}

/// Phase of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Submitting,
    Polling,
    Done,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitting => "submitting",
            Self::Polling => "polling",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Submits bundles and waits for them to finish
pub struct BundleTracker {
    submitter: JobSubmitter,
    scheduler: Arc<dyn Scheduler>,
    run_name: String,
    policy: PollPolicy,
}

impl BundleTracker {
    pub fn new(
        submitter: JobSubmitter,
        scheduler: Arc<dyn Scheduler>,
        run_name: impl Into<String>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            submitter,
            scheduler,
            run_name: run_name.into(),
            policy,
        }
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Submits `bundle_size` jobs for a dataset and waits until all of them left the scheduler
    ///
    /// # Returns
    /// The handles of the submitted jobs
    pub async fn run(
        &self,
        dataset_type: &str,
        bundle_size: usize,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<HashSet<JobHandle>> {
        let bundle = self.submit_bundle(dataset_type, bundle_size, context).await?;
        self.wait_for(&bundle, context, cancel).await?;
        Ok(bundle.into_handles())
    }

    /// Submits the jobs of a bundle one after another
    ///
    /// Every job is resolved before the first submission, so configuration
    /// problems surface before anything is queued. A failed submission
    /// aborts the bundle; jobs already queued are left running.
    pub async fn submit_bundle(
        &self,
        dataset_type: &str,
        bundle_size: usize,
        context: &PipelineContext,
    ) -> Result<BundleState> {
        self.enter(TrackerState::Submitting, context);
        context.log_info(format!(
            "Dataset {}. Started submitting jobs",
            dataset_type
        ));

        let specs = (0..bundle_size)
            .map(|index| self.submitter.job_spec(dataset_type, &self.run_name, index))
            .collect::<Result<Vec<_>>>()?;

        let mut bundle = BundleState::new(dataset_type);
        for spec in &specs {
            let handle = self.submitter.submit(spec, context).await?;
            if !bundle.track(handle.clone()) {
                context.log_warning(format!(
                    "Scheduler returned handle {} twice; tracking it once",
                    handle
                ));
            }
        }

        let mut handles: Vec<&JobHandle> = bundle.handles().iter().collect();
        handles.sort();
        context.log_info(format!(
            "Dataset {}. Started jobs {:?}",
            dataset_type, handles
        ));

        Ok(bundle)
    }

    /// Polls the scheduler until no handle of the bundle is active
    ///
    /// Never returns `Ok` while a tracked handle is still reported active.
    /// A failed status query is logged and retried at the next interval.
    pub async fn wait_for(
        &self,
        bundle: &BundleState,
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.enter(TrackerState::Polling, context);

        let started = Instant::now();
        let deadline = self.policy.max_wait.map(|max_wait| started + max_wait);
        let mut remaining: Vec<JobHandle> = bundle.still_active(bundle.handles());

        loop {
            if cancel.is_cancelled() {
                return Err(LeaderboardError::Cancelled { remaining });
            }

            match self.scheduler.active_jobs().await {
                Ok(active) => {
                    remaining = bundle.still_active(&active);
                    if remaining.is_empty() {
                        context.log_info(format!(
                            "Dataset {}. All jobs have finished",
                            bundle.dataset_type
                        ));
                        self.enter(TrackerState::Done, context);
                        return Ok(());
                    }
                    context.log_info(format!(
                        "Dataset {}. Jobs {:?} are still running",
                        bundle.dataset_type, remaining
                    ));
                }
                Err(e) => {
                    context.log_warning(format!("Failed to query active jobs: {}", e));
                }
            }

            let mut pause = self.policy.interval;
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return Err(LeaderboardError::StuckJobs {
                        remaining,
                        waited: now - started,
                    });
                }
                pause = pause.min(deadline - now);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(LeaderboardError::Cancelled { remaining });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    fn enter(&self, state: TrackerState, context: &PipelineContext) {
        context.log_debug(format!("Bundle tracker state: {}", state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SubmissionSettings;
    use crate::testing::{FakeScheduler, Poll};
    use leaderboard_core::domain::dataset::DatasetRegistry;

    fn tracker(scheduler: Arc<FakeScheduler>, policy: PollPolicy) -> BundleTracker {
        let submitter = JobSubmitter::new(
            scheduler.clone(),
            DatasetRegistry::new().with_dataset("tum", "/data/tum"),
            SubmissionSettings::new("/opt/eval/train.py", "/tmp/lsf"),
        );
        BundleTracker::new(submitter, scheduler, "exp1", policy)
    }

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(5), Some(Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_bundle_of_n_yields_n_distinct_handles() {
        let scheduler = Arc::new(FakeScheduler::new());
        let tracker = tracker(scheduler.clone(), fast());
        let context = PipelineContext::in_memory("tum");

        let handles = tracker
            .run("tum", 4, &context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(handles.len(), 4);
        let run_names: Vec<String> = scheduler
            .submissions()
            .iter()
            .map(|c| c.args.last().cloned().unwrap())
            .collect();
        assert_eq!(run_names, vec!["exp1_b_0", "exp1_b_1", "exp1_b_2", "exp1_b_3"]);
    }

    #[tokio::test]
    async fn test_polls_until_intersection_is_empty() {
        let scheduler = Arc::new(FakeScheduler::new().with_polls(vec![
            Poll::active(&["1000", "1001", "555"]),
            Poll::active(&["1001"]),
            Poll::Fail,
            Poll::active(&["1001", "777"]),
            Poll::active(&["777"]),
        ]));
        let tracker = tracker(scheduler.clone(), fast());
        let context = PipelineContext::in_memory("tum");

        tracker
            .run("tum", 2, &context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(scheduler.poll_count(), 5);
        assert!(
            context
                .entries()
                .iter()
                .any(|e| e.message.contains("Failed to query active jobs"))
        );
    }

    #[tokio::test]
    async fn test_unrelated_active_jobs_do_not_block() {
        let scheduler = Arc::new(FakeScheduler::new().with_polls(vec![Poll::active(&["1", "2"])]));
        let tracker = tracker(scheduler.clone(), fast());
        let context = PipelineContext::in_memory("tum");

        tracker
            .run("tum", 1, &context, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(scheduler.poll_count(), 1);
    }

    #[tokio::test]
    async fn test_stuck_job_times_out() {
        let scheduler = Arc::new(FakeScheduler::new().stuck());
        let policy = PollPolicy::new(Duration::from_millis(5), Some(Duration::from_millis(40)));
        let tracker = tracker(scheduler.clone(), policy);
        let context = PipelineContext::in_memory("tum");

        let err = tracker
            .run("tum", 2, &context, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            LeaderboardError::StuckJobs { remaining, waited } => {
                assert_eq!(remaining, vec![JobHandle::new("1000"), JobHandle::new("1001")]);
                assert!(waited >= Duration::from_millis(40));
            }
            other => panic!("expected StuckJobs, got {:?}", other),
        }
        assert!(scheduler.poll_count() >= 2);
    }

    #[tokio::test]
    async fn test_cancellation_ends_polling() {
        let scheduler = Arc::new(FakeScheduler::new().stuck());
        let tracker = tracker(scheduler.clone(), PollPolicy::new(Duration::from_secs(60), None));
        let context = PipelineContext::in_memory("tum");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = tracker.run("tum", 1, &context, &cancel).await.unwrap_err();
        assert!(matches!(err, LeaderboardError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_unknown_dataset_submits_nothing() {
        let scheduler = Arc::new(FakeScheduler::new());
        let tracker = tracker(scheduler.clone(), fast());
        let context = PipelineContext::in_memory("imagenet");

        let err = tracker
            .run("imagenet", 3, &context, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LeaderboardError::Configuration(_)));
        assert!(scheduler.submissions().is_empty());
        assert_eq!(scheduler.poll_count(), 0);
    }

    #[tokio::test]
    async fn test_submission_failure_aborts_bundle() {
        let scheduler = Arc::new(FakeScheduler::new().fail_submissions_after(1));
        let tracker = tracker(scheduler.clone(), fast());
        let context = PipelineContext::in_memory("tum");

        let err = tracker
            .run("tum", 3, &context, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LeaderboardError::SubmissionParse { .. }));
        assert_eq!(scheduler.submissions().len(), 2);
        assert_eq!(scheduler.poll_count(), 0);
    }
}
