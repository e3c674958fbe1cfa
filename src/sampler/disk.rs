//! Disk I/O sampling.
//!
//! Each device exposes the cumulative number of milliseconds it spent doing
//! I/O. The rate of that counter, in milliseconds per second, divided by ten
//! is the share of wall-clock time the device was busy, in percent.

use super::rate::{CounterRate, RateOutcome};
use super::Domain;
use crate::core::{CounterSource, DiskCounters, SourceError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::time::Instant;

/// Busy percentage of one block device over the last interval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskStat {
    pub name: String,
    pub usage: f64,
}

#[derive(Debug)]
struct Device {
    io_time: CounterRate,
    usage: f64,
}

/// One entry per device seen in the latest read.
#[derive(Debug, Default)]
pub struct DiskRegistry {
    devices: BTreeMap<String, Device>,
}

impl DiskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, counters: DiskCounters, at: Instant) {
        let mut next = BTreeMap::new();
        for (name, io_millis) in counters {
            let mut device = self.devices.remove(&name).unwrap_or_else(|| Device {
                io_time: CounterRate::new(),
                usage: f64::NAN,
            });
            device.usage = match device.io_time.observe(io_millis, at) {
                RateOutcome::Rate(millis_per_sec) => millis_per_sec / 10.0,
                RateOutcome::DuplicateTick => device.usage,
                RateOutcome::Baseline | RateOutcome::CounterReset => f64::NAN,
            };
            next.insert(name, device);
        }
        self.devices = next;
    }

    /// Current usage of every known device, ordered by name.
    pub fn stats(&self) -> Vec<DiskStat> {
        self.devices
            .iter()
            .map(|(name, device)| DiskStat {
                name: name.clone(),
                usage: device.usage,
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct DiskDomain {
    registry: Arc<RwLock<DiskRegistry>>,
}

impl DiskDomain {
    pub fn new(registry: Arc<RwLock<DiskRegistry>>) -> Self {
        Self { registry }
    }
}

impl Domain for DiskDomain {
    type Raw = DiskCounters;

    fn name(&self) -> &'static str {
        "disk"
    }

    fn read(source: &dyn CounterSource) -> Result<DiskCounters, SourceError> {
        source.read_disks()
    }

    fn apply(&mut self, raw: DiskCounters, at: Instant) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .update(raw, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn counters(entries: &[(&str, u64)]) -> DiskCounters {
        entries.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_disk_usage_percent() {
        let start = Instant::now();
        let mut registry = DiskRegistry::new();
        registry.update(counters(&[("sda", 1_000), ("sdb", 0)]), start);
        assert!(registry.stats().iter().all(|d| d.usage.is_nan()));

        // sda busy for 1.5s out of 2s, sdb for 20ms.
        registry.update(
            counters(&[("sda", 2_500), ("sdb", 20)]),
            start + Duration::from_secs(2),
        );
        let stats = registry.stats();
        assert_eq!(stats[0], DiskStat { name: "sda".into(), usage: 75.0 });
        assert_eq!(stats[1], DiskStat { name: "sdb".into(), usage: 1.0 });
    }

    #[test]
    fn test_removed_device_is_dropped() {
        let start = Instant::now();
        let mut registry = DiskRegistry::new();
        registry.update(counters(&[("sda", 1), ("sdc", 1)]), start);
        registry.update(counters(&[("sda", 2)]), start + Duration::from_secs(1));
        let names: Vec<_> = registry.stats().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["sda"]);
    }
}
