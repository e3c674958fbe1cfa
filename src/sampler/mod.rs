//! # Samplers
//!
//! A `Sampler` drives one metric domain (CPU, memory, processes, disks). On
//! every tick it reads the latest counters from the `CounterSource` on the
//! blocking pool, bounded by a timeout, and hands them to its `Domain`, which
//! converts them into gauge values or registry records.
//!
//! A failed or slow read skips the tick: the domain keeps its previous
//! baseline and the other samplers are not affected. A read that timed out
//! is left to finish on its own, and no new read is started for the domain
//! until it has; its late result is discarded.

pub mod cpu;
pub mod disk;
pub mod memory;
pub mod process;
pub mod rate;

use crate::core::{CounterSource, SourceError};
use crate::internal_metrics::Metrics;
use crate::stats::LastError;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// One metric domain fed by a sampler.
pub trait Domain: Send + 'static {
    /// The raw counters read on each tick.
    type Raw: Send + 'static;

    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Reads the raw counters. Called on the blocking pool.
    fn read(source: &dyn CounterSource) -> Result<Self::Raw, SourceError>;

    /// Folds counters read at `at` into the domain's state.
    fn apply(&mut self, raw: Self::Raw, at: Instant);
}

/// Why a tick did not update its domain.
#[derive(Error, Debug)]
pub enum SkipReason {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("previous read still in progress")]
    Busy,

    #[error("reader task failed: {0}")]
    Panicked(String),
}

impl SkipReason {
    /// A short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Source(e) => e.kind(),
            SkipReason::Timeout(_) => "timeout",
            SkipReason::Busy => "busy",
            SkipReason::Panicked(_) => "panic",
        }
    }
}

/// The result of a single tick.
#[derive(Debug)]
pub enum TickOutcome {
    Applied,
    Skipped(SkipReason),
}

impl TickOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TickOutcome::Applied)
    }
}

type ReadHandle<R> = JoinHandle<Result<(R, Instant), SourceError>>;

/// Periodically feeds one `Domain` from a `CounterSource`.
pub struct Sampler<D: Domain> {
    domain: D,
    source: Arc<dyn CounterSource>,
    read_timeout: Duration,
    last_error: Arc<LastError>,
    metrics: Metrics,
    ticks: watch::Sender<u64>,
    /// A read that outlived its timeout and may still be running.
    stalled: Option<ReadHandle<D::Raw>>,
}

impl<D: Domain> Sampler<D> {
    pub fn new(
        domain: D,
        source: Arc<dyn CounterSource>,
        read_timeout: Duration,
        last_error: Arc<LastError>,
        metrics: Metrics,
    ) -> Self {
        let (ticks, _) = watch::channel(0);
        Self {
            domain,
            source,
            read_timeout,
            last_error,
            metrics,
            ticks,
            stalled: None,
        }
    }

    /// Subscribes to the number of ticks completed so far, skipped or not.
    pub fn subscribe_ticks(&self) -> watch::Receiver<u64> {
        self.ticks.subscribe()
    }

    /// Performs a single tick.
    pub async fn tick(&mut self) -> TickOutcome {
        let name = self.domain.name();
        let started = std::time::Instant::now();

        let result = match self.stalled.take() {
            Some(stalled) if !stalled.is_finished() => {
                self.stalled = Some(stalled);
                Err(SkipReason::Busy)
            }
            // A finished stale read is dropped along with its result.
            _ => self.read().await,
        };

        let outcome = match result {
            Ok((raw, at)) => {
                self.domain.apply(raw, at);
                self.metrics.record_tick(name, started.elapsed());
                debug!(domain = name, "Tick applied");
                TickOutcome::Applied
            }
            Err(reason) => {
                warn!(domain = name, error = %reason, "Skipping tick, keeping previous baseline");
                self.metrics.record_skipped_tick(name, reason.label());
                self.last_error.record(name, &reason);
                TickOutcome::Skipped(reason)
            }
        };

        self.ticks.send_modify(|n| *n += 1);
        outcome
    }

    /// Reads on the blocking pool, stamping the counters when they were read.
    async fn read(&mut self) -> Result<(D::Raw, Instant), SkipReason> {
        let source = Arc::clone(&self.source);
        let mut read =
            tokio::task::spawn_blocking(move || D::read(&*source).map(|raw| (raw, Instant::now())));
        match tokio::time::timeout(self.read_timeout, &mut read).await {
            Ok(Ok(Ok(sample))) => Ok(sample),
            Ok(Ok(Err(e))) => Err(SkipReason::Source(e)),
            Ok(Err(e)) => Err(SkipReason::Panicked(e.to_string())),
            Err(_) => {
                self.stalled = Some(read);
                Err(SkipReason::Timeout(self.read_timeout))
            }
        }
    }

    /// Ticks every `period` until the shutdown signal fires.
    ///
    /// Ticks never overlap; a tick that runs late delays the next one.
    pub async fn run(mut self, period: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let name = self.domain.name();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(domain = name, ?period, source = self.source.name(), "Sampler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!(domain = name, "Sampler received shutdown signal.");
                    break;
                }
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        info!(domain = name, "Sampler finished.");
    }
}

#[cfg(test)]
mod tests {
    use super::cpu::{CpuDomain, CpuGauges};
    use super::*;
    use crate::core::CpuCounters;
    use crate::gauge::MetricContext;
    use crate::test_utils::FakeSource;

    fn cpu_sampler(source: Arc<FakeSource>) -> (Sampler<CpuDomain>, CpuGauges, Arc<LastError>) {
        let context = MetricContext::new("system");
        let gauges = CpuGauges::register(&context);
        let last_error = Arc::new(LastError::default());
        let sampler = Sampler::new(
            CpuDomain::new(gauges.clone()),
            source,
            Duration::from_secs(1),
            last_error.clone(),
            Metrics::new(),
        );
        (sampler, gauges, last_error)
    }

    #[tokio::test]
    async fn test_read_failure_skips_tick_and_keeps_baseline() {
        let source = Arc::new(FakeSource::new());
        source.push_cpu(Ok(CpuCounters { user: 100, kernel: 0, total: 1_000 }));
        source.push_cpu(Err("simulated failure"));
        source.push_cpu(Ok(CpuCounters { user: 300, kernel: 0, total: 2_000 }));
        let (mut sampler, gauges, last_error) = cpu_sampler(source);
        let ticks = sampler.subscribe_ticks();

        assert!(sampler.tick().await.is_applied());
        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = sampler.tick().await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::Source(_))));
        assert!(gauges.user.get().is_nan());
        assert!(last_error.get().unwrap().contains("simulated failure"));

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(sampler.tick().await.is_applied());
        // The delta spans the failed tick: 200 user ticks out of 1000.
        let (_, user_pct, _) = gauges.percentages();
        assert!((user_pct - 20.0).abs() < 1e-9, "unexpected user pct {}", user_pct);
        assert_eq!(*ticks.borrow(), 3);
    }

    #[tokio::test]
    async fn test_slow_read_times_out() {
        let source = Arc::new(FakeSource::new());
        source.set_read_delay(Duration::from_millis(200));
        source.push_cpu(Ok(CpuCounters::default()));

        let context = MetricContext::new("system");
        let mut sampler = Sampler::new(
            CpuDomain::new(CpuGauges::register(&context)),
            source,
            Duration::from_millis(20),
            Arc::new(LastError::default()),
            Metrics::new(),
        );

        let outcome = sampler.tick().await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::Timeout(_))));
    }

    #[tokio::test]
    async fn test_stalled_read_blocks_new_reads_until_it_finishes() {
        let source = Arc::new(FakeSource::new());
        source.set_read_delay(Duration::from_millis(300));
        source.push_cpu(Ok(CpuCounters::default()));

        let context = MetricContext::new("system");
        let last_error = Arc::new(LastError::default());
        let mut sampler = Sampler::new(
            CpuDomain::new(CpuGauges::register(&context)),
            source.clone(),
            Duration::from_millis(20),
            last_error.clone(),
            Metrics::new(),
        );

        let outcome = sampler.tick().await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::Timeout(_))));
        for _ in 0..7 {
            let outcome = sampler.tick().await;
            assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::Busy)));
        }
        assert_eq!(source.max_concurrent_reads(), 1);
        assert_eq!(
            last_error.get().as_deref(),
            Some("cpu: previous read still in progress")
        );

        // Once the stuck read is done, the next tick reads again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let outcome = sampler.tick().await;
        assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::Timeout(_))));
        assert_eq!(source.max_concurrent_reads(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let source = Arc::new(FakeSource::new());
        let (sampler, _, _) = cpu_sampler(source);
        let mut ticks = sampler.subscribe_ticks();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(sampler.run(Duration::from_millis(10), shutdown_rx));
        ticks.wait_for(|n| *n >= 2).await.unwrap();

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("sampler did not stop")
            .unwrap();
    }
}
