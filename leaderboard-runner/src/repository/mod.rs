//! Repository layer
//!
//! Repositories abstract the experiment-tracking service behind a small
//! trait so the aggregation logic can be tested without a server.

mod tracking;

// Re-export trait
pub use tracking::TrackingRepository;

// Re-export implementation
pub use tracking::HttpTrackingRepository;
