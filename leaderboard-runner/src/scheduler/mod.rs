//! Scheduler layer for the runner
//!
//! This layer talks to the external batch scheduler: it submits the jobs of
//! a bundle and polls the scheduler until none of them is active anymore.
//!
//! The scheduler itself sits behind the [`Scheduler`] trait so the bundle
//! logic can be exercised without a cluster.

pub mod lsf;
pub mod submitter;
pub mod tracker;

pub use lsf::LsfScheduler;
pub use submitter::{JobSubmitter, SubmissionSettings};
pub use tracker::{BundleTracker, PollPolicy};

use async_trait::async_trait;
use leaderboard_core::domain::job::{JobHandle, SubmissionCommand};
use std::collections::HashSet;

use crate::error::Result;

/// Command interface of the batch scheduler
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Submits one job and returns the handle the scheduler assigned to it
    async fn submit(&self, command: &SubmissionCommand) -> Result<JobHandle>;

    /// Returns the handles of every job the scheduler currently reports as active
    async fn active_jobs(&self) -> Result<HashSet<JobHandle>>;
}
