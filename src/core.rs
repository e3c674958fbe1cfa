//! Core domain types and the counter source contract for statsnap
//!
//! This module defines the raw counter snapshots handed over by the OS
//! readers and the trait that every platform-specific reader implements.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Cumulative CPU time counters, in clock ticks since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuCounters {
    /// Ticks spent in user mode (including niced work).
    pub user: u64,
    /// Ticks spent in kernel mode (system, irq and softirq).
    pub kernel: u64,
    /// Ticks available across all cores, busy or idle.
    pub total: u64,
}

/// Memory levels. These are not cumulative, they are read as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryCounters {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// One entry of a process enumeration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessCounters {
    pub pid: u32,
    /// Command name, as the kernel reports it.
    pub command: String,
    /// Owning user name (or numeric uid when it cannot be resolved).
    pub user: String,
    /// Cumulative ticks spent in user mode.
    pub cpu_user: u64,
    /// Cumulative ticks spent in kernel mode.
    pub cpu_kernel: u64,
    /// Resident set size in bytes.
    pub rss_bytes: u64,
    /// Virtual memory size in bytes.
    pub vsize_bytes: u64,
}

/// Cumulative milliseconds spent doing I/O, keyed by device name.
pub type DiskCounters = BTreeMap<String, u64>;

/// Errors a counter source can report for a single read.
///
/// Every variant is treated as a skipped tick by the samplers.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("counter source is not supported on this platform")]
    Unsupported,
}

impl SourceError {
    /// A short label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceError::Io { .. } => "io",
            SourceError::Parse { .. } => "parse",
            SourceError::Unsupported => "unsupported",
        }
    }
}

// =============================================================================
// Service Traits
// =============================================================================

/// Reads the latest cumulative OS counters.
///
/// Implementations are blocking; the samplers call them on the blocking pool
/// and bound each call with a timeout.
pub trait CounterSource: Send + Sync {
    /// A descriptive name for logging (e.g., "procfs").
    fn name(&self) -> &str;

    /// Reads system-wide CPU time counters.
    fn read_cpu(&self) -> Result<CpuCounters, SourceError>;

    /// Reads the current memory usage.
    fn read_memory(&self) -> Result<MemoryCounters, SourceError>;

    /// Enumerates live processes with their cumulative counters.
    ///
    /// Processes that disappear while being read are left out rather than
    /// failing the whole enumeration.
    fn list_processes(&self) -> Result<Vec<ProcessCounters>, SourceError>;

    /// Reads per-device cumulative I/O time.
    fn read_disks(&self) -> Result<DiskCounters, SourceError>;
}
