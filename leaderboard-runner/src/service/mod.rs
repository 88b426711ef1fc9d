//! Service layer
//!
//! Services contain the business logic of a leaderboard run. They
//! orchestrate the scheduler and tracking repositories:
//! - Aggregation: reduce a run family to one summary and publish it
//! - Dispatch: run one submit/track/aggregate pipeline per dataset

mod aggregation;
mod dispatcher;

pub use aggregation::MetricsAggregator;
pub use dispatcher::{DatasetDispatcher, DatasetOutcome};
