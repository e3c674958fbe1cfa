#![allow(dead_code)]

pub mod app;
pub mod proc_tree;

use statsnap::core::{CpuCounters, ProcessCounters};
use statsnap::test_utils::FakeSource;

/// Scripts `ticks` CPU reads growing by the same amounts each tick, so every
/// interval yields the same percentages no matter how long it lasted.
pub fn push_linear_cpu(source: &FakeSource, start: CpuCounters, step: CpuCounters, ticks: u64) {
    for i in 0..ticks {
        source.push_cpu(Ok(CpuCounters {
            user: start.user + i * step.user,
            kernel: start.kernel + i * step.kernel,
            total: start.total + i * step.total,
        }));
    }
}

pub fn process(pid: u32, command: &str, cpu_user: u64, cpu_kernel: u64, rss_bytes: u64) -> ProcessCounters {
    ProcessCounters {
        pid,
        command: command.to_string(),
        user: "root".to_string(),
        cpu_user,
        cpu_kernel,
        rss_bytes,
        vsize_bytes: 168_000_000,
    }
}
