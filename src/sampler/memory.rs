//! System memory sampling. Memory figures are levels, so no delta is taken.

use super::Domain;
use crate::core::{CounterSource, MemoryCounters, SourceError};
use crate::gauge::{percent_of, Gauge, MetricContext};
use std::sync::Arc;
use tokio::time::Instant;

/// Gauges fed by the memory sampler, in bytes.
#[derive(Debug, Clone)]
pub struct MemoryGauges {
    pub used: Arc<Gauge>,
    pub total: Arc<Gauge>,
}

impl MemoryGauges {
    pub fn register(context: &MetricContext) -> Self {
        Self {
            used: context.gauge("memory.used"),
            total: context.gauge("memory.total"),
        }
    }

    pub fn used_percent(&self) -> f64 {
        percent_of(self.used.get(), self.total.get())
    }
}

#[derive(Debug)]
pub struct MemoryDomain {
    gauges: MemoryGauges,
}

impl MemoryDomain {
    pub fn new(gauges: MemoryGauges) -> Self {
        Self { gauges }
    }
}

impl Domain for MemoryDomain {
    type Raw = MemoryCounters;

    fn name(&self) -> &'static str {
        "memory"
    }

    fn read(source: &dyn CounterSource) -> Result<MemoryCounters, SourceError> {
        source.read_memory()
    }

    fn apply(&mut self, raw: MemoryCounters, _at: Instant) {
        self.gauges.used.set(raw.used_bytes as f64);
        self.gauges.total.set(raw.total_bytes as f64);
    }
}
