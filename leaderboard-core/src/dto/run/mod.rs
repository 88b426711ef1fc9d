//! Run DTOs

use serde::{Deserialize, Serialize};

use crate::domain::metrics::RunRecord;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

/// Which runs a search returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewType {
    ActiveOnly,
    DeletedOnly,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    /// Non-finite values travel as `"NaN"`, `"Infinity"` and `"-Infinity"`
    #[serde(with = "metric_value")]
    pub value: f64,
    pub timestamp: i64,
    #[serde(default)]
    pub step: i64,
}

/// Protobuf JSON mapping of a double
mod metric_value {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value == f64::INFINITY {
            serializer.serialize_str("Infinity")
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str("-Infinity")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Wire::deserialize(deserializer)? {
            Wire::Number(value) => Ok(value),
            Wire::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "Infinity" => Ok(f64::INFINITY),
                "-Infinity" => Ok(f64::NEG_INFINITY),
                other => other
                    .parse()
                    .map_err(|_| D::Error::custom(format!("invalid metric value '{}'", other))),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    #[serde(default)]
    pub status: Option<RunStatus>,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunData {
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub params: Vec<Param>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub info: RunInfo,
    #[serde(default)]
    pub data: RunData,
}

impl From<Run> for RunRecord {
    /// Flattens a run; the latest logged value of each metric wins
    fn from(run: Run) -> Self {
        let params = run
            .data
            .params
            .into_iter()
            .map(|p| (p.key, p.value))
            .collect();
        let metrics = run
            .data
            .metrics
            .into_iter()
            .map(|m| (m.key, m.value))
            .collect();

        RunRecord {
            run_id: run.info.run_id,
            params,
            metrics,
        }
    }
}

/// Request of `runs/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRuns {
    pub experiment_ids: Vec<String>,
    pub run_view_type: ViewType,
    pub max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

/// Response of `runs/search`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRunsResponse {
    #[serde(default)]
    pub runs: Vec<Run>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Request of `runs/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRun {
    pub experiment_id: String,
    pub run_name: String,
    pub start_time: i64,
}

/// Response of `runs/create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRunResponse {
    pub run: Run,
}

/// Request of `runs/log-batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogBatch {
    pub run_id: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default)]
    pub params: Vec<Param>,
}

/// Request of `runs/update`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRun {
    pub run_id: String,
    pub status: RunStatus,
    pub end_time: i64,
}
