//! Conversion of cumulative counters into per-second rates.

use crate::gauge::Gauge;
use tokio::time::Instant;

/// What a single observation of a cumulative counter produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateOutcome {
    /// First observation; there is nothing to compare against yet.
    Baseline,
    /// A valid rate in counter units per second.
    Rate(f64),
    /// The counter went backwards. The new value became the baseline.
    CounterReset,
    /// No time elapsed since the previous observation. The previous
    /// baseline is kept.
    DuplicateTick,
}

impl RateOutcome {
    /// Publishes the outcome to a gauge.
    ///
    /// A counter reset leaves the gauge unset rather than holding a value
    /// from an older interval. Baselines and duplicate ticks leave it as is.
    pub fn publish(self, gauge: &Gauge) {
        match self {
            RateOutcome::Rate(rate) => gauge.set(rate),
            RateOutcome::CounterReset => gauge.reset(),
            RateOutcome::Baseline | RateOutcome::DuplicateTick => {}
        }
    }
}

/// Tracks the previous observation of one cumulative counter.
#[derive(Debug, Clone, Default)]
pub struct CounterRate {
    previous: Option<(u64, Instant)>,
}

impl CounterRate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the value read at `at` and returns the resulting rate.
    pub fn observe(&mut self, value: u64, at: Instant) -> RateOutcome {
        let Some((prev_value, prev_at)) = self.previous else {
            self.previous = Some((value, at));
            return RateOutcome::Baseline;
        };

        let elapsed = at.saturating_duration_since(prev_at);
        if elapsed.is_zero() {
            return RateOutcome::DuplicateTick;
        }

        self.previous = Some((value, at));
        if value < prev_value {
            return RateOutcome::CounterReset;
        }
        RateOutcome::Rate((value - prev_value) as f64 / elapsed.as_secs_f64())
    }
}
