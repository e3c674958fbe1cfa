//! Gauges and the metric context that owns them.
//!
//! A `Gauge` holds the latest value derived from an OS counter. It starts
//! unset, which is represented as NaN, and is written by exactly one sampler
//! while being read by any number of report builders.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A thread-safe single-value metric cell.
///
/// The value is stored as the bit pattern of an `f64` in an `AtomicU64`, so a
/// reader can never observe a partially written value.
#[derive(Debug)]
pub struct Gauge {
    name: String,
    bits: AtomicU64,
}

impl Gauge {
    /// Creates an unset gauge.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bits: AtomicU64::new(f64::NAN.to_bits()),
        }
    }

    /// The fully qualified metric name, e.g. `system.cpu.user`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replaces the stored value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
        metrics::gauge!("statsnap_gauge", "metric" => self.name.clone()).set(value);
    }

    /// Returns the last value set, or NaN when unset.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Forces the gauge back to unset.
    pub fn reset(&self) {
        self.set(f64::NAN);
    }
}

/// Unset (and non-finite) values serialize as `null`.
impl Serialize for Gauge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let value = self.get();
        if value.is_finite() {
            serializer.serialize_f64(value)
        } else {
            serializer.serialize_none()
        }
    }
}

/// Expresses `value` as a percentage of `total`.
///
/// Returns NaN when either side is unset or the total is zero, so that an
/// unmeasurable value is never reported as an idle one.
pub fn percent_of(value: f64, total: f64) -> f64 {
    if value.is_nan() || total.is_nan() || total == 0.0 {
        return f64::NAN;
    }
    value / total * 100.0
}

/// Owns every gauge of one running inspector, one instance per name.
#[derive(Debug, Default)]
pub struct MetricContext {
    namespace: String,
    gauges: Mutex<HashMap<String, Arc<Gauge>>>,
}

impl MetricContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            gauges: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the gauge registered under `name`, creating it unset if needed.
    pub fn gauge(&self, name: &str) -> Arc<Gauge> {
        let mut gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        gauges
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Gauge::new(format!("{}.{}", self.namespace, name))))
            .clone()
    }

    /// Names of all registered gauges, sorted.
    pub fn names(&self) -> Vec<String> {
        let gauges = self.gauges.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = gauges.keys().cloned().collect();
        names.sort();
        names
    }
}
