//! Job domain types
//!
//! A bundle is a fixed number of identical evaluation jobs submitted for one
//! dataset. Each submission yields a scheduler-assigned [`JobHandle`]; the
//! bundle is finished once none of its handles is reported active anymore.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Scheduler-assigned identifier of a submitted job
///
/// Opaque to this system: only used for membership tests against the set of
/// jobs the scheduler reports as active.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One evaluation job of a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub dataset_type: String,
    pub dataset_root: PathBuf,
    /// Base run name shared by the whole bundle
    pub run_name: String,
    pub bundle_index: usize,
}

impl JobSpec {
    /// Run name recorded by the trainer for this job: `<run_name>_b_<index>`
    pub fn job_run_name(&self) -> String {
        format!("{}_b_{}", self.run_name, self.bundle_index)
    }
}

/// Fully resolved scheduler submission (program plus argv)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for SubmissionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{}\"", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Handles submitted for one dataset, tracked until they leave the scheduler
#[derive(Debug, Clone)]
pub struct BundleState {
    pub dataset_type: String,
    handles: HashSet<JobHandle>,
}

impl BundleState {
    pub fn new(dataset_type: impl Into<String>) -> Self {
        Self {
            dataset_type: dataset_type.into(),
            handles: HashSet::new(),
        }
    }

    /// Records a freshly submitted handle
    ///
    /// Returns false if the scheduler handed out a handle already tracked.
    pub fn track(&mut self, handle: JobHandle) -> bool {
        self.handles.insert(handle)
    }

    pub fn handles(&self) -> &HashSet<JobHandle> {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Tracked handles that are still present in the scheduler's active set
    pub fn still_active(&self, active: &HashSet<JobHandle>) -> Vec<JobHandle> {
        let mut remaining: Vec<JobHandle> = self.handles.intersection(active).cloned().collect();
        remaining.sort();
        remaining
    }

    pub fn into_handles(self) -> HashSet<JobHandle> {
        self.handles
    }
}
