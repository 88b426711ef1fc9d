//! Core domain types
//!
//! This module contains the domain structures shared by the tracking client
//! and the runner. Nothing in here performs I/O; the runner owns every
//! interaction with the scheduler and the tracking service.

pub mod dataset;
pub mod job;
pub mod log;
pub mod metrics;
