//! Metric domain types and aggregation
//!
//! Every job of a bundle logs its own run to the tracking service. Runs that
//! share a base run name form a [`RunFamily`]; the family is reduced to one
//! [`SummaryRecord`] holding the mean and population variance of every test
//! metric.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Metric name -> value for one completed run
pub type MetricRecord = BTreeMap<String, f64>;

/// Parameter holding the run name the trainer was launched with
pub const RUN_NAME_PARAM: &str = "run_name";

/// Parameter holding the evaluated model's name
pub const MODEL_NAME_PARAM: &str = "model.name";

/// Model name used when the first run of a family does not declare one
pub const UNKNOWN_MODEL: &str = "Unknown";

/// Substring selecting which metrics are summarized
pub const SUMMARY_METRIC_MARKER: &str = "test";

/// Suffix of the published summary run
pub const SUMMARY_SUFFIX: &str = "_av";

/// A run as read back from the tracking service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub params: HashMap<String, String>,
    pub metrics: MetricRecord,
}

impl RunRecord {
    /// Declared run name, taken from the `run_name` parameter
    pub fn declared_run_name(&self) -> Option<&str> {
        self.params.get(RUN_NAME_PARAM).map(String::as_str)
    }

    pub fn model_name(&self) -> Option<&str> {
        self.params.get(MODEL_NAME_PARAM).map(String::as_str)
    }
}

/// Strips the bundle suffix from a run name
///
/// The name is split on `_` and the trailing two tokens (`b`, `<index>`) are
/// dropped. Names with fewer than three tokens have an empty base.
pub fn base_run_name(run_name: &str) -> String {
    let tokens: Vec<&str> = run_name.split('_').collect();
    let keep = tokens.len().saturating_sub(2);
    tokens[..keep].join("_")
}

/// Which metric keys survive grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// Keys of the first record only; later keys are dropped
    #[default]
    FirstSeen,
    /// Every key seen in any record
    Union,
    /// Only keys present in every record
    Intersection,
}

impl FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-seen" | "first_seen" | "first" => Ok(Self::FirstSeen),
            "union" => Ok(Self::Union),
            "intersection" => Ok(Self::Intersection),
            other => Err(format!(
                "unknown metric key policy '{}' (expected first-seen, union or intersection)",
                other
            )),
        }
    }
}

impl fmt::Display for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FirstSeen => "first-seen",
            Self::Union => "union",
            Self::Intersection => "intersection",
        };
        f.write_str(name)
    }
}

/// Metric name -> values gathered across a family, in run order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatedMetrics {
    values: BTreeMap<String, Vec<f64>>,
}

impl AggregatedMetrics {
    pub fn from_records(records: &[MetricRecord], policy: KeyPolicy) -> Self {
        let keys: BTreeSet<&String> = match (policy, records.first()) {
            (_, None) => BTreeSet::new(),
            (KeyPolicy::FirstSeen, Some(first)) => first.keys().collect(),
            (KeyPolicy::Union, Some(_)) => records.iter().flat_map(|r| r.keys()).collect(),
            (KeyPolicy::Intersection, Some(first)) => first
                .keys()
                .filter(|k| records.iter().all(|r| r.contains_key(*k)))
                .collect(),
        };

        let mut values: BTreeMap<String, Vec<f64>> =
            keys.into_iter().map(|k| (k.clone(), Vec::new())).collect();

        for record in records {
            for (key, value) in record {
                if let Some(seq) = values.get_mut(key) {
                    seq.push(*value);
                }
            }
        }

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&[f64]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Arithmetic mean, `None` for an empty sequence
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance (divisor `n`), `None` for an empty sequence
pub fn population_variance(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some(sum_sq / values.len() as f64)
}

/// Runs of one dataset whose base name equals the configured run name
#[derive(Debug, Clone, PartialEq)]
pub struct RunFamily {
    pub run_name: String,
    /// Model name declared by the first member
    pub model_name: Option<String>,
    pub records: Vec<MetricRecord>,
    /// Runs skipped because they declare no run name
    pub unnamed_runs: usize,
}

impl RunFamily {
    /// Selects the members of `run_name`'s family out of every run of an experiment
    ///
    /// Matching is exact on the base name, never by prefix.
    pub fn collect<I>(run_name: &str, runs: I) -> Self
    where
        I: IntoIterator<Item = RunRecord>,
    {
        let mut family = Self {
            run_name: run_name.to_string(),
            model_name: None,
            records: Vec::new(),
            unnamed_runs: 0,
        };

        for run in runs {
            let Some(declared) = run.declared_run_name() else {
                family.unnamed_runs += 1;
                continue;
            };
            if base_run_name(declared) != run_name {
                continue;
            }
            if family.records.is_empty() {
                family.model_name =
                    Some(run.model_name().unwrap_or(UNKNOWN_MODEL).to_string());
            }
            family.records.push(run.metrics);
        }

        family
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Reduces the family to its summary
    ///
    /// Returns `None` for an empty family: statistics over zero runs are
    /// undefined and are never published.
    pub fn summarize(&self, policy: KeyPolicy) -> Option<SummaryRecord> {
        if self.records.is_empty() {
            return None;
        }

        let aggregated = AggregatedMetrics::from_records(&self.records, policy);
        let mut means = BTreeMap::new();
        let mut variances = BTreeMap::new();

        for (key, values) in aggregated.iter() {
            if !key.contains(SUMMARY_METRIC_MARKER) {
                continue;
            }
            if let (Some(m), Some(v)) = (mean(values), population_variance(values)) {
                means.insert(key.to_string(), m);
                variances.insert(key.to_string(), v);
            }
        }

        Some(SummaryRecord {
            run_name: format!("{}{}", self.run_name, SUMMARY_SUFFIX),
            model_name: self
                .model_name
                .clone()
                .unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            run_count: self.records.len(),
            means,
            variances,
        })
    }
}

/// Averaged result published once per dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Published run name, `<run_name>_av`
    pub run_name: String,
    pub model_name: String,
    pub run_count: usize,
    pub means: BTreeMap<String, f64>,
    pub variances: BTreeMap<String, f64>,
}

impl SummaryRecord {
    /// Metrics as logged: `<key>_mean` and `<key>_var`
    pub fn metrics(&self) -> Vec<(String, f64)> {
        let means = self.means.iter().map(|(k, v)| (format!("{}_mean", k), *v));
        let vars = self.variances.iter().map(|(k, v)| (format!("{}_var", k), *v));
        means.chain(vars).collect()
    }

    /// Parameters as logged, `starting_time` supplied by the publisher
    pub fn params(&self, starting_time: &str) -> Vec<(String, String)> {
        vec![
            (RUN_NAME_PARAM.to_string(), self.run_name.clone()),
            ("starting_time".to_string(), starting_time.to_string()),
            (MODEL_NAME_PARAM.to_string(), self.model_name.clone()),
            (
                "num_of_runs_to_average".to_string(),
                self.run_count.to_string(),
            ),
        ]
    }
}
