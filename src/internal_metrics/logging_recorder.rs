//! A metrics recorder that periodically logs all captured metrics.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use metrics_util::registry::{AtomicStorage, Registry};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

type MetricRegistry = Arc<Registry<Key, AtomicStorage>>;

/// A metrics recorder that keeps every metric in memory. Its `MetricsReporter`
/// logs them through `tracing`.
pub struct LoggingRecorder {
    registry: MetricRegistry,
}

impl Default for LoggingRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingRecorder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new(AtomicStorage)),
        }
    }

    /// A handle that logs this recorder's metrics. It stays valid after the
    /// recorder itself is installed globally.
    pub fn reporter(&self) -> MetricsReporter {
        MetricsReporter {
            registry: self.registry.clone(),
        }
    }
}

/// Logs the metrics captured by a `LoggingRecorder`.
#[derive(Clone)]
pub struct MetricsReporter {
    registry: MetricRegistry,
}

impl MetricsReporter {
    /// Logs every counter and gauge, and a count/mean summary of each
    /// histogram since the previous snapshot. Returns the number of series
    /// logged.
    pub fn log_snapshot(&self) -> usize {
        debug!("--- Metrics Snapshot ---");
        let mut logged = 0;

        for (key, counter) in self.registry.get_counter_handles() {
            let value = counter.load(Ordering::Relaxed);
            info!(metric = %key, value, "[Counter]");
            logged += 1;
        }

        for (key, gauge) in self.registry.get_gauge_handles() {
            let value = f64::from_bits(gauge.load(Ordering::Relaxed));
            info!(metric = %key, value, "[Gauge]");
            logged += 1;
        }

        // Histogram samples are drained so each snapshot covers one interval.
        for (key, histogram) in self.registry.get_histogram_handles() {
            let mut count = 0usize;
            let mut sum = 0.0;
            histogram.clear_with(|values| {
                count += values.len();
                sum += values.iter().sum::<f64>();
            });
            if count > 0 {
                info!(metric = %key, count, mean = sum / count as f64, "[Histogram]");
                logged += 1;
            }
        }

        logged
    }

    /// Logs a snapshot every `interval` until shutdown.
    pub async fn run(self, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately and there is nothing to log yet.
        ticker.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    info!("Metrics logging task received shutdown signal.");
                    break;
                }
                _ = ticker.tick() => {
                    self.log_snapshot();
                }
            }
        }
    }
}

impl Recorder for LoggingRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        self.registry.get_or_create_counter(key, |c| c.clone()).into()
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        self.registry.get_or_create_gauge(key, |g| g.clone()).into()
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        self.registry.get_or_create_histogram(key, |h| h.clone()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> Metadata<'static> {
        Metadata::new("test", metrics::Level::INFO, Some("test"))
    }

    #[test]
    fn test_snapshot_logs_all_series() {
        let recorder = LoggingRecorder::new();
        let reporter = recorder.reporter();

        let ticks = recorder.register_counter(&Key::from_name("statsnap_ticks_total"), &metadata());
        ticks.increment(3);
        let gauge = recorder.register_gauge(&Key::from_name("statsnap_gauge"), &metadata());
        gauge.set(42.5);
        let histogram =
            recorder.register_histogram(&Key::from_name("statsnap_tick_duration_seconds"), &metadata());
        histogram.record(0.5);
        histogram.record(1.5);

        assert_eq!(reporter.log_snapshot(), 3);

        let counters = recorder.registry.get_counter_handles();
        assert_eq!(counters.values().next().unwrap().load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_histograms_are_drained_between_snapshots() {
        let recorder = LoggingRecorder::new();
        let reporter = recorder.reporter();
        let histogram = recorder.register_histogram(&Key::from_name("duration"), &metadata());
        histogram.record(0.25);

        assert_eq!(reporter.log_snapshot(), 1);
        // Nothing new recorded: the histogram is not logged again.
        assert_eq!(reporter.log_snapshot(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let reporter = LoggingRecorder::new().reporter();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(reporter.run(Duration::from_millis(10), rx));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("reporter did not stop")
            .unwrap();
    }
}
