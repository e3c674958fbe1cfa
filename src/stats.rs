//! The metrics context shared by the samplers and the report builder.

use crate::config::{FilterConfig, FilterMode};
use crate::gauge::MetricContext;
use crate::registry::{accept_all, threshold_filter, ProcessRegistry};
use crate::sampler::cpu::CpuGauges;
use crate::sampler::disk::DiskRegistry;
use crate::sampler::memory::MemoryGauges;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// The most recent reason a tick was skipped, in any domain.
#[derive(Debug, Default)]
pub struct LastError(Mutex<Option<String>>);

impl LastError {
    pub fn record(&self, domain: &str, error: &dyn Display) {
        let mut last = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(format!("{}: {}", domain, error));
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Everything the samplers write and the report builder reads.
#[derive(Debug, Clone)]
pub struct Stats {
    pub cpu: CpuGauges,
    pub memory: MemoryGauges,
    pub processes: Arc<RwLock<ProcessRegistry>>,
    pub disks: Arc<RwLock<DiskRegistry>>,
    pub last_error: Arc<LastError>,
}

impl Stats {
    /// Registers all gauges in `context` and sets up empty registries.
    pub fn register(context: &MetricContext, filter: &FilterConfig) -> Self {
        let cpu = CpuGauges::register(context);
        let memory = MemoryGauges::register(context);

        let mut processes = ProcessRegistry::new();
        processes.set_filter(match filter.mode {
            FilterMode::All => accept_all(),
            FilterMode::Threshold => threshold_filter(
                cpu.total.clone(),
                memory.total.clone(),
                filter.min_cpu_pct,
                filter.min_mem_pct,
            ),
        });

        Self {
            cpu,
            memory,
            processes: Arc::new(RwLock::new(processes)),
            disks: Arc::new(RwLock::new(DiskRegistry::new())),
            last_error: Arc::new(LastError::default()),
        }
    }
}
