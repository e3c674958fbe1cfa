//! Ordering of processes and disks by usage.
//!
//! All functions here are pure: they take a copy of the registry contents and
//! return new vectors. Unavailable (NaN) values never take part in a ranking.

use crate::registry::PerProcessStat;
use crate::sampler::disk::DiskStat;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised for caller mistakes when asking for a ranking.
#[derive(Error, Debug, PartialEq)]
pub enum InspectError {
    #[error("unknown ranking dimension '{0}' (expected cpu, cpu_user, cpu_kernel or memory)")]
    UnknownDimension(String),

    #[error("invalid pid selector '{0}' (expected 'all' or a process id)")]
    InvalidPidSelector(String),
}

/// The usage dimension a ranking is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Cpu,
    CpuUser,
    CpuKernel,
    Memory,
}

impl Dimension {
    /// All dimensions, in report order.
    pub const ALL: [Dimension; 4] = [
        Dimension::Cpu,
        Dimension::CpuUser,
        Dimension::CpuKernel,
        Dimension::Memory,
    ];

    /// The value of this dimension for a record.
    pub fn value(self, stat: &PerProcessStat) -> f64 {
        match self {
            Dimension::Cpu => stat.cpu_total,
            Dimension::CpuUser => stat.cpu_user,
            Dimension::CpuKernel => stat.cpu_kernel,
            Dimension::Memory => stat.memory,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Cpu => "cpu",
            Dimension::CpuUser => "cpu_user",
            Dimension::CpuKernel => "cpu_kernel",
            Dimension::Memory => "memory",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| InspectError::UnknownDimension(s.to_string()))
    }
}

/// Which processes a ranking considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PidSelector {
    #[default]
    All,
    Pid(u32),
}

impl PidSelector {
    pub fn matches(self, stat: &PerProcessStat) -> bool {
        match self {
            PidSelector::All => true,
            PidSelector::Pid(pid) => stat.pid == pid,
        }
    }
}

impl fmt::Display for PidSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidSelector::All => f.write_str("all"),
            PidSelector::Pid(pid) => write!(f, "{}", pid),
        }
    }
}

impl FromStr for PidSelector {
    type Err = InspectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(PidSelector::All);
        }
        s.parse()
            .map(PidSelector::Pid)
            .map_err(|_| InspectError::InvalidPidSelector(s.to_string()))
    }
}

/// Orders the records matching `selector` by `dimension`, highest first.
///
/// Records without a value for the dimension are left out. Ties are broken
/// by ascending pid.
pub fn rank(
    records: &[PerProcessStat],
    selector: PidSelector,
    dimension: Dimension,
) -> Vec<PerProcessStat> {
    records
        .iter()
        .filter(|stat| selector.matches(stat))
        .filter(|stat| !dimension.value(stat).is_nan())
        .sorted_by(|a, b| descending(dimension.value(a), dimension.value(b)).then(a.pid.cmp(&b.pid)))
        .cloned()
        .collect()
}

/// Orders disks by usage, highest first, ties broken by device name.
pub fn rank_disks(disks: &[DiskStat]) -> Vec<DiskStat> {
    disks
        .iter()
        .filter(|disk| !disk.usage.is_nan())
        .sorted_by(|a, b| descending(a.usage, b.usage).then_with(|| a.name.cmp(&b.name)))
        .cloned()
        .collect()
}

/// The first `min(n, len)` entries of a ranking.
pub fn top_n<T: Clone>(ranked: &[T], n: usize) -> Vec<T> {
    ranked.iter().take(n).cloned().collect()
}

fn descending(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}
