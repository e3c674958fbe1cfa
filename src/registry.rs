//! Per-process rate records.
//!
//! The registry keeps one `PerProcessStat` per live pid. It is refreshed from
//! a full process enumeration on every tick; pids missing from the latest
//! enumeration are dropped together with their baselines.

use crate::core::ProcessCounters;
use crate::gauge::{percent_of, Gauge};
use crate::sampler::rate::{CounterRate, RateOutcome};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;

/// Derived usage of a single process over the last interval.
///
/// Every numeric field is either a non-negative value or NaN when no delta
/// is available yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerProcessStat {
    pub pid: u32,
    pub command: String,
    pub user: String,
    /// User plus kernel CPU ticks per second.
    pub cpu_total: f64,
    /// User-mode CPU ticks per second.
    pub cpu_user: f64,
    /// Kernel-mode CPU ticks per second.
    pub cpu_kernel: f64,
    /// Resident set size in bytes.
    pub memory: f64,
    /// Virtual memory size in bytes.
    pub vsize_bytes: u64,
}

impl PerProcessStat {
    fn unmeasured(counters: &ProcessCounters) -> Self {
        Self {
            pid: counters.pid,
            command: counters.command.clone(),
            user: counters.user.clone(),
            cpu_total: f64::NAN,
            cpu_user: f64::NAN,
            cpu_kernel: f64::NAN,
            memory: f64::NAN,
            vsize_bytes: counters.vsize_bytes,
        }
    }
}

/// Decides whether a process is worth reporting.
pub type PidFilter = Arc<dyn Fn(&PerProcessStat) -> bool + Send + Sync>;

/// A filter that keeps every process.
pub fn accept_all() -> PidFilter {
    Arc::new(|_| true)
}

/// A filter that keeps processes using more than `min_cpu_pct` of the CPU
/// capacity or more than `min_mem_pct` of total memory.
///
/// The gauges are read at evaluation time, so the decision follows the
/// latest system-wide samples.
pub fn threshold_filter(
    cpu_capacity: Arc<Gauge>,
    memory_total: Arc<Gauge>,
    min_cpu_pct: f64,
    min_mem_pct: f64,
) -> PidFilter {
    Arc::new(move |stat| {
        let cpu_pct = percent_of(stat.cpu_total, cpu_capacity.get());
        let mem_pct = percent_of(stat.memory, memory_total.get());
        cpu_pct > min_cpu_pct || mem_pct > min_mem_pct
    })
}

struct Tracked {
    user: CounterRate,
    kernel: CounterRate,
    stat: PerProcessStat,
}

/// One record per live pid, with the baselines needed for the next delta.
pub struct ProcessRegistry {
    tracked: HashMap<u32, Tracked>,
    filter: PidFilter,
}

impl fmt::Debug for ProcessRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessRegistry")
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    /// Creates an empty registry that reports every process.
    pub fn new() -> Self {
        Self {
            tracked: HashMap::new(),
            filter: accept_all(),
        }
    }

    /// Replaces the interest filter.
    pub fn set_filter(&mut self, filter: PidFilter) {
        self.filter = filter;
    }

    /// Refreshes the registry from a full enumeration read at `at`.
    pub fn update(&mut self, processes: Vec<ProcessCounters>, at: Instant) {
        let mut next = HashMap::with_capacity(processes.len());

        for counters in processes {
            let mut tracked = self.tracked.remove(&counters.pid).unwrap_or_else(|| Tracked {
                user: CounterRate::new(),
                kernel: CounterRate::new(),
                stat: PerProcessStat::unmeasured(&counters),
            });

            let user = tracked.user.observe(counters.cpu_user, at);
            let kernel = tracked.kernel.observe(counters.cpu_kernel, at);

            tracked.stat = match (user, kernel) {
                (RateOutcome::Rate(user), RateOutcome::Rate(kernel)) => PerProcessStat {
                    cpu_total: user + kernel,
                    cpu_user: user,
                    cpu_kernel: kernel,
                    memory: counters.rss_bytes as f64,
                    ..PerProcessStat::unmeasured(&counters)
                },
                (RateOutcome::DuplicateTick, RateOutcome::DuplicateTick) => PerProcessStat {
                    command: counters.command.clone(),
                    user: counters.user.clone(),
                    ..tracked.stat
                },
                // First sighting or a counter that went backwards (pid reuse).
                _ => PerProcessStat::unmeasured(&counters),
            };

            next.insert(counters.pid, tracked);
        }

        // Whatever is left in `tracked` has exited.
        self.tracked = next;
    }

    /// Records that pass the interest filter, ordered by pid.
    pub fn records(&self) -> Vec<PerProcessStat> {
        let mut records: Vec<PerProcessStat> = self
            .tracked
            .values()
            .map(|t| &t.stat)
            .filter(|&stat| (self.filter)(stat))
            .cloned()
            .collect();
        records.sort_by_key(|stat| stat.pid);
        records
    }

    /// Returns `true` when `pid` is tracked, whether or not it is filtered.
    pub fn contains(&self, pid: u32) -> bool {
        self.tracked.contains_key(&pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn process(pid: u32, cpu_user: u64, cpu_kernel: u64, rss_bytes: u64) -> ProcessCounters {
        ProcessCounters {
            pid,
            command: format!("proc{}", pid),
            user: "root".to_string(),
            cpu_user,
            cpu_kernel,
            rss_bytes,
            vsize_bytes: rss_bytes * 2,
        }
    }

    #[test]
    fn test_new_pid_is_unmeasured() {
        let mut registry = ProcessRegistry::new();
        registry.update(vec![process(1, 100, 50, 4096)], Instant::now());

        let records = registry.records();
        assert_eq!(records.len(), 1);
        assert!(records[0].cpu_total.is_nan());
        assert!(records[0].cpu_user.is_nan());
        assert!(records[0].cpu_kernel.is_nan());
        assert!(records[0].memory.is_nan());
    }

    #[test]
    fn test_second_tick_produces_rates() {
        let start = Instant::now();
        let mut registry = ProcessRegistry::new();
        registry.update(vec![process(1, 100, 50, 4096)], start);
        registry.update(vec![process(1, 400, 150, 8192)], start + Duration::from_secs(3));

        let records = registry.records();
        let record = &records[0];
        assert_eq!(record.cpu_user, 100.0);
        assert!((record.cpu_kernel - 33.333).abs() < 0.001);
        assert!((record.cpu_total - 133.333).abs() < 0.001);
        assert_eq!(record.memory, 8192.0);
        assert_eq!(record.vsize_bytes, 16384);
    }

    #[test]
    fn test_exited_pids_are_dropped() {
        let start = Instant::now();
        let mut registry = ProcessRegistry::new();
        registry.update(vec![process(1, 0, 0, 1), process(2, 0, 0, 1)], start);
        registry.update(vec![process(2, 10, 10, 1)], start + Duration::from_secs(1));

        assert!(!registry.contains(1));
        assert!(registry.contains(2));
        assert_eq!(registry.records().len(), 1);

        // A pid that comes back starts over without a delta.
        registry.update(
            vec![process(1, 500, 500, 1), process(2, 20, 20, 1)],
            start + Duration::from_secs(2),
        );
        let records = registry.records();
        assert!(records[0].cpu_total.is_nan());
        assert_eq!(records[1].cpu_total, 20.0);
    }

    #[test]
    fn test_counter_decrease_is_unmeasured() {
        let start = Instant::now();
        let mut registry = ProcessRegistry::new();
        registry.update(vec![process(7, 1_000, 1_000, 1)], start);
        registry.update(vec![process(7, 10, 10, 1)], start + Duration::from_secs(1));
        assert!(registry.records()[0].cpu_total.is_nan());

        registry.update(vec![process(7, 20, 30, 1)], start + Duration::from_secs(2));
        assert_eq!(registry.records()[0].cpu_total, 30.0);
    }

    #[test]
    fn test_filtered_processes_keep_their_baseline() {
        let start = Instant::now();
        let mut registry = ProcessRegistry::new();
        registry.set_filter(Arc::new(|stat: &PerProcessStat| stat.pid != 1));

        registry.update(vec![process(1, 0, 0, 1)], start);
        registry.update(vec![process(1, 100, 0, 1)], start + Duration::from_secs(1));
        assert!(registry.records().is_empty());
        assert!(registry.contains(1));

        // Once the filter lets it through, the delta is already available.
        registry.set_filter(accept_all());
        assert_eq!(registry.records()[0].cpu_user, 100.0);
    }

    #[test]
    fn test_threshold_filter() {
        let capacity = Arc::new(Gauge::new("cpu.total"));
        let memory_total = Arc::new(Gauge::new("memory.total"));
        capacity.set(400.0);
        memory_total.set(1_000_000.0);
        let filter = threshold_filter(capacity, memory_total, 1.0, 1.0);

        let mut stat = PerProcessStat::unmeasured(&process(1, 0, 0, 0));
        stat.cpu_total = 8.0; // 2% of capacity
        stat.memory = 0.0;
        assert!(filter(&stat));

        stat.cpu_total = 2.0; // 0.5%
        stat.memory = 50_000.0; // 5%
        assert!(filter(&stat));

        stat.memory = 5_000.0; // 0.5%
        assert!(!filter(&stat));
    }
}
