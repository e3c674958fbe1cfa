//! Per-process sampling into the shared `ProcessRegistry`.

use super::Domain;
use crate::core::{CounterSource, ProcessCounters, SourceError};
use crate::registry::ProcessRegistry;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;

#[derive(Debug)]
pub struct ProcessDomain {
    registry: Arc<RwLock<ProcessRegistry>>,
}

impl ProcessDomain {
    pub fn new(registry: Arc<RwLock<ProcessRegistry>>) -> Self {
        Self { registry }
    }
}

impl Domain for ProcessDomain {
    type Raw = Vec<ProcessCounters>;

    fn name(&self) -> &'static str {
        "process"
    }

    fn read(source: &dyn CounterSource) -> Result<Vec<ProcessCounters>, SourceError> {
        source.list_processes()
    }

    fn apply(&mut self, raw: Vec<ProcessCounters>, at: Instant) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update(raw, at);
    }
}
