//! Leaderboard Core
//!
//! Core types for the benchmark leaderboard system.
//!
//! This crate contains:
//! - Domain types: jobs, bundles, datasets, metric records and summaries
//! - DTOs: wire types for the experiment-tracking service

pub mod domain;
pub mod dto;
