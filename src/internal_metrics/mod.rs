//! # Internal Metrics Module
//!
//! Self-observability for the samplers, built on the `metrics` facade.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: Installs the `LoggingRecorder` when metric logging
//!   is enabled, spawns its reporting task and the optional
//!   `SystemCollector`, and hands back the `Metrics` handle.
//!
//! - **`Metrics`**: A lightweight, cloneable handle used by the samplers and
//!   the snapshot builder to record ticks, skipped ticks and reports.
//!
//! - **`LoggingRecorder`**: (Defined in `logging_recorder.rs`) Keeps every
//!   metric in memory and logs a snapshot of them at a fixed interval.
//!
//! - **`SystemCollector`**: (Defined in `system.rs`) Periodically publishes
//!   statsnap's own CPU and memory footprint.

pub mod logging_recorder;
pub mod system;

use crate::config::MetricsConfig;
use crate::task_manager::TaskManager;
use logging_recorder::LoggingRecorder;
use metrics::{Counter, Unit};
use std::time::Duration;
use system::SystemCollector;
use tracing::{info, warn};

/// The public API for the metrics system.
#[derive(Clone)]
pub struct Metrics {
    pub snapshots_total: Counter,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Creates a new `Metrics` instance and registers descriptions for all
    /// supported metrics with the global recorder.
    pub fn new() -> Self {
        metrics::describe_counter!("statsnap_ticks_total", Unit::Count, "Sampler ticks whose counters were applied, labeled by domain.");
        metrics::describe_counter!("statsnap_skipped_ticks_total", Unit::Count, "Sampler ticks skipped because the read failed or timed out, labeled by domain and reason.");
        metrics::describe_histogram!("statsnap_tick_duration_seconds", Unit::Seconds, "Time taken to read and apply one tick, labeled by domain.");
        metrics::describe_counter!("statsnap_snapshots_total", Unit::Count, "Reports built from the current samples.");
        metrics::describe_gauge!("statsnap_gauge", "Latest value of each sampled gauge, labeled by metric name.");
        metrics::describe_gauge!("process_cpu_usage_percent", Unit::Percent, "The percentage of CPU time the `statsnap` process is currently using.");
        metrics::describe_gauge!("process_memory_usage_bytes", Unit::Bytes, "The resident set size of the `statsnap` process, in bytes.");

        Self {
            snapshots_total: metrics::counter!("statsnap_snapshots_total"),
        }
    }

    /// Records a tick whose counters were applied.
    pub fn record_tick(&self, domain: &'static str, elapsed: Duration) {
        metrics::counter!("statsnap_ticks_total", "domain" => domain).increment(1);
        metrics::histogram!("statsnap_tick_duration_seconds", "domain" => domain)
            .record(elapsed.as_secs_f64());
    }

    /// Records a tick that was skipped, with a short reason label.
    pub fn record_skipped_tick(&self, domain: &'static str, reason: &'static str) {
        metrics::counter!("statsnap_skipped_ticks_total", "domain" => domain, "reason" => reason)
            .increment(1);
    }
}

/// Builder for the metrics system.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Installs the configured recorder and spawns the background tasks on
    /// `tasks`. Returns the handle used by the rest of the application.
    ///
    /// A recorder can only be installed once per process. When one is
    /// already present, metric logging stays off and a warning is logged.
    pub fn build(self, tasks: &TaskManager) -> Metrics {
        if self.config.log_metrics {
            let recorder = LoggingRecorder::new();
            let reporter = recorder.reporter();
            match metrics::set_global_recorder(recorder) {
                Ok(()) => {
                    let interval = Duration::from_secs(self.config.log_aggregation_seconds.max(1));
                    info!(?interval, "Logging internal metrics");
                    tasks.spawn("MetricsLogger", reporter.run(interval, tasks.get_shutdown_rx()));
                }
                Err(e) => warn!(error = %e, "Metrics recorder already installed, not logging metrics"),
            }
        }

        if self.config.self_monitoring {
            let collector = SystemCollector::new();
            tasks.spawn(
                "SystemCollector",
                collector.run(system::COLLECTION_INTERVAL, tasks.get_shutdown_rx()),
            );
        }

        Metrics::new()
    }
}
