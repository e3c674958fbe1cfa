//! System-wide CPU time sampling.

use super::rate::CounterRate;
use super::Domain;
use crate::core::{CounterSource, CpuCounters, SourceError};
use crate::gauge::{Gauge, MetricContext};
use std::sync::Arc;
use tokio::time::Instant;

/// Gauges fed by the CPU sampler, all in ticks per second.
#[derive(Debug, Clone)]
pub struct CpuGauges {
    /// User plus kernel.
    pub usage: Arc<Gauge>,
    pub user: Arc<Gauge>,
    pub kernel: Arc<Gauge>,
    /// Capacity across all cores, busy or idle.
    pub total: Arc<Gauge>,
}

impl CpuGauges {
    pub fn register(context: &MetricContext) -> Self {
        Self {
            usage: context.gauge("cpu.usage"),
            user: context.gauge("cpu.user"),
            kernel: context.gauge("cpu.kernel"),
            total: context.gauge("cpu.total"),
        }
    }

    /// CPU usage as percentages of capacity: (usage, user, kernel).
    pub fn percentages(&self) -> (f64, f64, f64) {
        let total = self.total.get();
        (
            crate::gauge::percent_of(self.usage.get(), total),
            crate::gauge::percent_of(self.user.get(), total),
            crate::gauge::percent_of(self.kernel.get(), total),
        )
    }
}

/// Turns `/proc/stat`-style tick counters into per-second rates.
#[derive(Debug)]
pub struct CpuDomain {
    gauges: CpuGauges,
    usage: CounterRate,
    user: CounterRate,
    kernel: CounterRate,
    total: CounterRate,
}

impl CpuDomain {
    pub fn new(gauges: CpuGauges) -> Self {
        Self {
            gauges,
            usage: CounterRate::new(),
            user: CounterRate::new(),
            kernel: CounterRate::new(),
            total: CounterRate::new(),
        }
    }
}

impl Domain for CpuDomain {
    type Raw = CpuCounters;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn read(source: &dyn CounterSource) -> Result<CpuCounters, SourceError> {
        source.read_cpu()
    }

    fn apply(&mut self, raw: CpuCounters, at: Instant) {
        self.usage
            .observe(raw.user.saturating_add(raw.kernel), at)
            .publish(&self.gauges.usage);
        self.user.observe(raw.user, at).publish(&self.gauges.user);
        self.kernel.observe(raw.kernel, at).publish(&self.gauges.kernel);
        self.total.observe(raw.total, at).publish(&self.gauges.total);
    }
}
