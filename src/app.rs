//! The main application logic, decoupled from the entry point.

use crate::{
    config::Config,
    core::CounterSource,
    gauge::MetricContext,
    internal_metrics::{Metrics, MetricsBuilder},
    platform,
    ranking::{Dimension, PidSelector},
    sampler::{
        cpu::CpuDomain, disk::DiskDomain, memory::MemoryDomain, process::ProcessDomain, Domain,
        Sampler,
    },
    snapshot::{ProcessEntry, Report, SnapshotBuilder},
    stats::Stats,
    task_manager::TaskManager,
};
use anyhow::{anyhow, bail, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument};

/// Namespace of the gauges registered by the samplers.
pub const METRIC_NAMESPACE: &str = "system";

/// A handle to the running samplers.
pub struct App {
    task_manager: TaskManager,
    shutdown_tx: watch::Sender<bool>,
    stats: Stats,
    context: MetricContext,
    snapshots: SnapshotBuilder,
    metrics: Metrics,
    ticks: Vec<(&'static str, watch::Receiver<u64>)>,
    selector: PidSelector,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    /// Builds a report from the latest samples. Never waits for a tick.
    pub fn snapshot(&self, selector: &PidSelector) -> Report {
        self.metrics.snapshots_total.increment(1);
        self.snapshots.build(*selector)
    }

    /// The top processes by one dimension, from the latest samples.
    pub fn top(&self, dimension: Dimension, selector: &PidSelector) -> Vec<ProcessEntry> {
        self.snapshots.top(dimension, *selector)
    }

    /// The process selector from the configuration.
    pub fn configured_selector(&self) -> PidSelector {
        self.selector
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Names of all registered gauges, without the namespace.
    pub fn gauge_names(&self) -> Vec<String> {
        self.context.names()
    }

    /// Names of the background tasks started by `build`.
    pub fn task_names(&self) -> Vec<&'static str> {
        self.task_manager.task_names()
    }

    /// Resolves once every sampler has completed at least `n` ticks,
    /// applied or skipped.
    pub async fn wait_for_ticks(&self, n: u64) -> Result<()> {
        for (name, ticks) in &self.ticks {
            let mut ticks = ticks.clone();
            ticks
                .wait_for(|count| *count >= n)
                .await
                .map_err(|_| anyhow!("{} stopped before completing {} ticks", name, n))?;
        }
        Ok(())
    }

    /// Stops all samplers and waits for them to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("Shutting down samplers...");
        // Receivers may already be gone if every task exited on its own.
        let _ = self.shutdown_tx.send(true);
        let panicked = self.task_manager.shutdown().await;
        if !panicked.is_empty() {
            bail!("tasks failed during shutdown: {}", panicked.join(", "));
        }
        info!("All samplers shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the samplers from running them, and lets tests
/// replace the counter source and the metrics handle.
pub struct AppBuilder {
    config: Config,
    source_override: Option<Arc<dyn CounterSource>>,
    metrics_override: Option<Metrics>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source_override: None,
            metrics_override: None,
        }
    }

    /// Overrides the counter source for testing.
    pub fn source_override(mut self, source: Arc<dyn CounterSource>) -> Self {
        self.source_override = Some(source);
        self
    }

    /// Overrides the metrics system for testing.
    pub fn metrics_override(mut self, metrics: Metrics) -> Self {
        self.metrics_override = Some(metrics);
        self
    }

    /// Starts one sampler per domain and returns the running `App`.
    ///
    /// Sampling stops when `shutdown_rx` fires or `App::shutdown` is called.
    #[instrument(skip_all)]
    pub async fn build(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        config.validate()?;
        let selector = config.pid_selector()?;

        let (shutdown_tx, internal_rx) = watch::channel(false);
        let task_manager = TaskManager::new(internal_rx);

        let metrics = match self.metrics_override {
            Some(metrics) => metrics,
            None => MetricsBuilder::new(config.metrics.clone()).build(&task_manager),
        };

        let source = match self.source_override {
            Some(source) => source,
            None => platform::default_source(&config.procfs)?,
        };

        let context = MetricContext::new(METRIC_NAMESPACE);
        let stats = Stats::register(&context, &config.filter);

        let spawner = SamplerSpawner {
            tasks: &task_manager,
            source: &source,
            stats: &stats,
            metrics: &metrics,
            config: &config,
        };
        let ticks = vec![
            spawner.spawn("CpuSampler", CpuDomain::new(stats.cpu.clone())),
            spawner.spawn("MemorySampler", MemoryDomain::new(stats.memory.clone())),
            spawner.spawn("ProcessSampler", ProcessDomain::new(stats.processes.clone())),
            spawner.spawn("DiskSampler", DiskDomain::new(stats.disks.clone())),
        ];

        // Relays the caller's shutdown signal to the samplers.
        let relay_tx = shutdown_tx.clone();
        let mut internal_rx = task_manager.get_shutdown_rx();
        task_manager.spawn("ShutdownRelay", async move {
            tokio::select! {
                result = shutdown_rx.changed() => {
                    if result.is_ok() {
                        let _ = relay_tx.send(true);
                    }
                }
                _ = internal_rx.changed() => {}
            }
        });

        info!(
            source = source.name(),
            interval_ms = config.sampling.interval_ms,
            %selector,
            "Sampling started"
        );

        Ok(App {
            task_manager,
            shutdown_tx,
            snapshots: SnapshotBuilder::new(stats.clone(), config.report.clone()),
            stats,
            context,
            metrics,
            ticks,
            selector,
        })
    }
}

struct SamplerSpawner<'a> {
    tasks: &'a TaskManager,
    source: &'a Arc<dyn CounterSource>,
    stats: &'a Stats,
    metrics: &'a Metrics,
    config: &'a Config,
}

impl SamplerSpawner<'_> {
    fn spawn<D: Domain>(&self, task_name: &'static str, domain: D) -> (&'static str, watch::Receiver<u64>) {
        let sampler = Sampler::new(
            domain,
            self.source.clone(),
            self.config.sampling.read_timeout(),
            self.stats.last_error.clone(),
            self.metrics.clone(),
        );
        let ticks = sampler.subscribe_ticks();
        self.tasks.spawn(
            task_name,
            sampler.run(self.config.sampling.interval(), self.tasks.get_shutdown_rx()),
        );
        (task_name, ticks)
    }
}
