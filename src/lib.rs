//! statsnap - samples OS counters and reports usage snapshots
//!
//! Samplers periodically read cumulative CPU, memory, process and disk
//! counters, turn them into per-second rates held in gauges and registries,
//! and a snapshot builder ranks processes and renders a JSON report from
//! whatever was sampled last.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod formatting;
pub mod gauge;
pub mod internal_metrics;
pub mod platform;
pub mod ranking;
pub mod registry;
pub mod sampler;
pub mod snapshot;
pub mod stats;
pub mod task_manager;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
