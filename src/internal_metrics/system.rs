//! # Self-Monitoring Collector
//!
//! `SystemCollector` publishes statsnap's own CPU and memory footprint
//! through the `metrics` facade. It uses the `sysinfo` crate, which is
//! independent of the `CounterSource` the samplers read from.

use std::time::Duration;
use sysinfo::{Pid, System};
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info};

pub const COLLECTION_INTERVAL: Duration = Duration::from_secs(10);

/// Collects CPU and memory usage for the current process.
pub struct SystemCollector {
    system: System,
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCollector {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }

    /// Refreshes the figures for `pid` and publishes them.
    ///
    /// Returns `(cpu_percent, rss_bytes)`, or `None` if the process is gone.
    pub fn collect(&mut self, pid: Pid) -> Option<(f32, u64)> {
        self.system.refresh_cpu();
        if !self.system.refresh_process(pid) {
            return None;
        }
        let process = self.system.process(pid)?;
        let (cpu, memory) = (process.cpu_usage(), process.memory());
        metrics::gauge!("process_cpu_usage_percent").set(cpu as f64);
        metrics::gauge!("process_memory_usage_bytes").set(memory as f64);
        Some((cpu, memory))
    }

    /// Collects every `period` until shutdown or until the process can no
    /// longer be found.
    pub async fn run(mut self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => pid,
            Err(e) => {
                error!(error = %e, "Failed to get current PID");
                return;
            }
        };

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("SystemCollector received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    if self.collect(pid).is_none() {
                        error!(%pid, "Monitored process no longer found. Collector is shutting down.");
                        break;
                    }
                }
            }
        }
    }
}
