//! In-process fakes of the scheduler and the tracking service

use async_trait::async_trait;
use leaderboard_core::domain::job::{JobHandle, SubmissionCommand};
use leaderboard_core::domain::metrics::{MODEL_NAME_PARAM, RUN_NAME_PARAM, RunRecord, SummaryRecord};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::error::{LeaderboardError, Result};
use crate::repository::TrackingRepository;
use crate::scheduler::Scheduler;

/// One scripted answer to an active-jobs query
pub enum Poll {
    Active(Vec<String>),
    Fail,
}

impl Poll {
    pub fn active(ids: &[&str]) -> Self {
        Self::Active(ids.iter().map(|id| id.to_string()).collect())
    }
}

/// Scheduler handing out sequential handles starting at 1000
///
/// Active-jobs queries follow the script; once it is exhausted nothing is
/// active, unless the scheduler is stuck, in which case every submitted job
/// stays active forever.
pub struct FakeScheduler {
    next_id: AtomicU64,
    submissions: Mutex<Vec<SubmissionCommand>>,
    submitted: Mutex<Vec<JobHandle>>,
    polls: Mutex<VecDeque<Poll>>,
    poll_count: AtomicUsize,
    stuck: bool,
    fail_after: Option<usize>,
}

impl FakeScheduler {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            submissions: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            polls: Mutex::new(VecDeque::new()),
            poll_count: AtomicUsize::new(0),
            stuck: false,
            fail_after: None,
        }
    }

    pub fn with_polls(mut self, polls: Vec<Poll>) -> Self {
        self.polls = Mutex::new(polls.into());
        self
    }

    pub fn stuck(mut self) -> Self {
        self.stuck = true;
        self
    }

    /// Accept `n` submissions, then answer with unparseable output
    pub fn fail_submissions_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    pub fn submissions(&self) -> Vec<SubmissionCommand> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.poll_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scheduler for FakeScheduler {
    async fn submit(&self, command: &SubmissionCommand) -> Result<JobHandle> {
        let accepted = {
            let mut submissions = self.submissions.lock().unwrap();
            submissions.push(command.clone());
            submissions.len()
        };

        if self.fail_after.is_some_and(|n| accepted > n) {
            return Err(LeaderboardError::SubmissionParse {
                output: "Request aborted by esub. Job not submitted.".to_string(),
            });
        }

        let handle = JobHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        self.submitted.lock().unwrap().push(handle.clone());
        Ok(handle)
    }

    async fn active_jobs(&self) -> Result<HashSet<JobHandle>> {
        self.poll_count.fetch_add(1, Ordering::SeqCst);

        if self.stuck {
            return Ok(self.submitted.lock().unwrap().iter().cloned().collect());
        }

        match self.polls.lock().unwrap().pop_front() {
            Some(Poll::Active(ids)) => Ok(ids.into_iter().map(JobHandle::new).collect()),
            Some(Poll::Fail) => Err(LeaderboardError::SchedulerCommand {
                command: "bjobs".to_string(),
                message: "LSF is down".to_string(),
            }),
            None => Ok(HashSet::new()),
        }
    }
}

/// Tracking service holding experiments in memory
pub struct FakeTracking {
    experiments: HashMap<String, (String, Vec<RunRecord>)>,
    published: Mutex<Vec<(String, SummaryRecord, String)>>,
}

impl FakeTracking {
    pub fn new() -> Self {
        Self {
            experiments: HashMap::new(),
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn with_experiment(mut self, name: &str, id: &str, runs: Vec<RunRecord>) -> Self {
        self.experiments
            .insert(name.to_string(), (id.to_string(), runs));
        self
    }

    /// Published summaries as (experiment ID, summary, starting time)
    pub fn published(&self) -> Vec<(String, SummaryRecord, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingRepository for FakeTracking {
    async fn find_experiment(&self, name: &str) -> Result<Option<String>> {
        Ok(self.experiments.get(name).map(|(id, _)| id.clone()))
    }

    async fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        Ok(self
            .experiments
            .values()
            .find(|(id, _)| id == experiment_id)
            .map(|(_, runs)| runs.clone())
            .unwrap_or_default())
    }

    async fn publish_summary(
        &self,
        experiment_id: &str,
        summary: &SummaryRecord,
        starting_time: &str,
    ) -> Result<String> {
        let mut published = self.published.lock().unwrap();
        published.push((
            experiment_id.to_string(),
            summary.clone(),
            starting_time.to_string(),
        ));
        Ok(format!("summary-{}", published.len()))
    }
}

/// A finished bundle run as the trainer logs it
pub fn trainer_run(id: &str, run_name: &str, model: Option<&str>, metrics: &[(&str, f64)]) -> RunRecord {
    let mut params = HashMap::new();
    params.insert(RUN_NAME_PARAM.to_string(), run_name.to_string());
    if let Some(model) = model {
        params.insert(MODEL_NAME_PARAM.to_string(), model.to_string());
    }

    RunRecord {
        run_id: id.to_string(),
        params,
        metrics: metrics.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    }
}
