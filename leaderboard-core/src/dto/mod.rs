//! Data Transfer Objects for the experiment-tracking service
//!
//! Wire types of the MLflow-compatible REST API (version 2.0). Fields the
//! service omits when empty are defaulted so sparse responses still parse.

pub mod experiment;
pub mod run;
