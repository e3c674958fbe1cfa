//! Turns the current gauges and registries into a `Report`.
//!
//! Building a report never waits for a tick: it reads whatever the samplers
//! published last. Values that are not available yet render as `n/a`.

use crate::config::{ReportConfig, ThresholdConfig};
use crate::formatting::{
    format_bytes, format_disk_usage, format_gigabytes, format_megabytes, format_percent, truncate,
};
use crate::gauge::percent_of;
use crate::ranking::{rank, rank_disks, top_n, Dimension, PidSelector};
use crate::registry::PerProcessStat;
use crate::stats::Stats;
use serde::Serialize;
use std::sync::PoisonError;

const MAX_NAME_LEN: usize = 10;

/// System-wide usage as percentages of capacity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Percentages {
    pub cpu: f64,
    pub user: f64,
    pub kernel: f64,
    pub memory: f64,
}

/// Problems for the current cycle, in a fixed order.
///
/// Comparisons are strict and a NaN percentage never triggers a problem.
pub fn evaluate_problems(percentages: &Percentages, thresholds: &ThresholdConfig) -> Vec<String> {
    let mut problems = Vec::new();
    if percentages.cpu > thresholds.cpu_pct {
        problems.push(format!("CPU usage is > {}%", thresholds.cpu_pct));
    }
    if percentages.kernel > thresholds.kernel_pct {
        problems.push(format!("CPU usage in kernel is > {}%", thresholds.kernel_pct));
    }
    if percentages.memory > thresholds.memory_pct {
        problems.push(format!("Memory usage > {}%", thresholds.memory_pct));
    }
    problems
}

/// The report printed by the binary.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub user: String,
    pub process_stat: ProcessStat,
    pub vm_stat: VmStat,
    pub last_error: String,
    pub top: TopProcesses,
    pub generated_at: String,
    #[serde(skip)]
    pub percentages: Percentages,
}

/// Figures for the busiest process.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessStat {
    pub pid: String,
    pub name: String,
    pub cpu_usage: String,
    pub cpu_user: String,
    pub cpu_system: String,
    pub memory_usage: String,
    pub memory_total: String,
    pub issue_detected: Vec<String>,
}

/// Figures for the whole machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmStat {
    pub cpu_usage: String,
    pub cpu_user: String,
    pub cpu_system: String,
    pub memory_usage: String,
    pub memory_total: String,
    pub disk_storage_usage: String,
}

/// The top entries of each ranking.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopProcesses {
    pub cpu: Vec<ProcessEntry>,
    pub cpu_user: Vec<ProcessEntry>,
    pub cpu_kernel: Vec<ProcessEntry>,
    pub memory: Vec<ProcessEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub value: String,
}

impl ProcessEntry {
    /// Renders `stat` by `dimension`: CPU as a share of `capacity`, memory
    /// as a byte size.
    fn new(stat: &PerProcessStat, dimension: Dimension, capacity: f64) -> Self {
        Self {
            pid: stat.pid,
            name: truncate(&stat.command, MAX_NAME_LEN),
            user: truncate(&stat.user, MAX_NAME_LEN),
            value: match dimension {
                Dimension::Memory => format_bytes(stat.memory),
                _ => format_percent(percent_of(dimension.value(stat), capacity)),
            },
        }
    }
}

/// Builds reports from a shared `Stats`.
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    stats: Stats,
    config: ReportConfig,
}

impl SnapshotBuilder {
    pub fn new(stats: Stats, config: ReportConfig) -> Self {
        Self { stats, config }
    }

    /// Current system-wide percentages. Gauges are read one at a time, so the
    /// values may come from neighbouring ticks.
    pub fn percentages(&self) -> Percentages {
        let (cpu, user, kernel) = self.stats.cpu.percentages();
        Percentages {
            cpu,
            user,
            kernel,
            memory: self.stats.memory.used_percent(),
        }
    }

    fn records(&self) -> Vec<PerProcessStat> {
        self.stats
            .processes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .records()
    }

    /// The top `top_n` processes matching `selector` by a single dimension.
    pub fn top(&self, dimension: Dimension, selector: PidSelector) -> Vec<ProcessEntry> {
        let capacity = self.stats.cpu.total.get();
        top_n(&rank(&self.records(), selector, dimension), self.config.top_n)
            .iter()
            .map(|stat| ProcessEntry::new(stat, dimension, capacity))
            .collect()
    }

    pub fn build(&self, selector: PidSelector) -> Report {
        let percentages = self.percentages();
        let problems = evaluate_problems(&percentages, &self.config.thresholds);
        let capacity = self.stats.cpu.total.get();

        let records = self.records();
        let disks = self
            .stats
            .disks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats();

        let ranked = |dimension| top_n(&rank(&records, selector, dimension), self.config.top_n);
        let by_cpu = ranked(Dimension::Cpu);
        let by_user = ranked(Dimension::CpuUser);
        let by_kernel = ranked(Dimension::CpuKernel);
        let by_memory = ranked(Dimension::Memory);

        let cpu_percent = |stat: &PerProcessStat, dimension: Dimension| {
            format_percent(percent_of(dimension.value(stat), capacity))
        };
        let first = |ranked: &[PerProcessStat], render: &dyn Fn(&PerProcessStat) -> String| {
            ranked.first().map(render).unwrap_or_default()
        };

        let process_stat = ProcessStat {
            pid: first(&by_cpu, &|s| s.pid.to_string()),
            name: first(&by_cpu, &|s| truncate(&s.command, MAX_NAME_LEN)),
            cpu_usage: first(&by_cpu, &|s| cpu_percent(s, Dimension::Cpu)),
            cpu_user: first(&by_user, &|s| cpu_percent(s, Dimension::CpuUser)),
            cpu_system: first(&by_kernel, &|s| cpu_percent(s, Dimension::CpuKernel)),
            memory_usage: first(&by_memory, &|s| format_bytes(s.memory)),
            memory_total: first(&by_memory, &|s| format_megabytes(s.vsize_bytes as f64)),
            issue_detected: problems,
        };

        let vm_stat = VmStat {
            cpu_usage: format_percent(percentages.cpu),
            cpu_user: format_percent(percentages.user),
            cpu_system: format_percent(percentages.kernel),
            memory_usage: format_percent(percentages.memory),
            memory_total: format_gigabytes(self.stats.memory.total.get()),
            disk_storage_usage: format_disk_usage(&top_n(
                &rank_disks(&disks),
                self.config.disk_top_n,
            )),
        };

        let entries = |ranked: &[PerProcessStat], dimension: Dimension| -> Vec<ProcessEntry> {
            ranked
                .iter()
                .map(|stat| ProcessEntry::new(stat, dimension, capacity))
                .collect()
        };

        Report {
            user: first(&by_cpu, &|s| truncate(&s.user, MAX_NAME_LEN)),
            process_stat,
            vm_stat,
            last_error: self.stats.last_error.get().unwrap_or_default(),
            top: TopProcesses {
                cpu: entries(&by_cpu, Dimension::Cpu),
                cpu_user: entries(&by_user, Dimension::CpuUser),
                cpu_kernel: entries(&by_kernel, Dimension::CpuKernel),
                memory: entries(&by_memory, Dimension::Memory),
            },
            generated_at: chrono::Utc::now().to_rfc3339(),
            percentages,
        }
    }
}
