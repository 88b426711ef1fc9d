//! Dataset registry
//!
//! Maps benchmark dataset names to their on-disk roots. The roots are
//! supplied by the environment; a dataset whose root is not configured is
//! simply unknown.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sentinel accepted on the command line meaning "every leaderboard dataset"
pub const LEADERBOARD_SENTINEL: &str = "leaderboard";

/// Datasets evaluated in leaderboard mode
pub const LEADERBOARD_DATASETS: [&str; 3] = ["kitti_4/6", "discoman_v10", "tum"];

/// Every known dataset paired with the environment variable holding its root
pub const DATASET_ROOT_VARS: [(&str, &str); 5] = [
    ("discoman_v10", "DISCOMAN_V10_PATH"),
    ("discoman_debug", "DISCOMAN_V10_PATH"),
    ("kitti_4/6", "KITTI_PATH"),
    ("tum", "TUM_PATH"),
    ("tum_debug", "TUM_PATH"),
];

/// Which datasets a dispatch targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetSelection {
    Single(String),
    Leaderboard,
}

impl DatasetSelection {
    pub fn parse(dataset_type: &str) -> Self {
        if dataset_type == LEADERBOARD_SENTINEL {
            Self::Leaderboard
        } else {
            Self::Single(dataset_type.to_string())
        }
    }

    pub fn datasets(&self) -> Vec<String> {
        match self {
            Self::Single(name) => vec![name.clone()],
            Self::Leaderboard => LEADERBOARD_DATASETS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

/// Known datasets and their roots
#[derive(Debug, Clone, Default)]
pub struct DatasetRegistry {
    roots: BTreeMap<String, PathBuf>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from a variable lookup (usually `std::env::var`)
    ///
    /// Datasets whose variable is missing or empty are left out.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::new();
        for (dataset, var) in DATASET_ROOT_VARS {
            if let Some(root) = lookup(var).filter(|r| !r.is_empty()) {
                registry = registry.with_dataset(dataset, root);
            }
        }
        registry
    }

    pub fn with_dataset(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(name.into(), root.into());
        self
    }

    pub fn root(&self, dataset_type: &str) -> Option<&Path> {
        self.roots.get(dataset_type).map(PathBuf::as_path)
    }

    pub fn contains(&self, dataset_type: &str) -> bool {
        self.roots.contains_key(dataset_type)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.roots.keys().map(String::as_str)
    }
}

/// File-name friendly form of a dataset name (`kitti_4/6` -> `kitti_4_6`)
pub fn sanitize_dataset_name(dataset_type: &str) -> String {
    dataset_type.replace('/', "_")
}
