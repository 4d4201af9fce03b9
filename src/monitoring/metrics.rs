//! Engine metrics.
//!
//! Lock-free counters and a latency histogram, exported in Prometheus text
//! format.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment by 1.
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Cumulative histogram of observations, in seconds.
#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<f64>,
    bucket_counts: Vec<AtomicU64>,
    /// f64 bits
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Buckets suited to metric source round trips.
    pub fn new() -> Self {
        Self::with_buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])
    }

    /// Create with custom bucket upper bounds.
    pub fn with_buckets(buckets: Vec<f64>) -> Self {
        let bucket_counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            bucket_counts,
            sum: AtomicU64::new(0f64.to_bits()),
            count: AtomicU64::new(0),
        }
    }

    /// Record one observation.
    pub fn observe(&self, value: f64) {
        for (bound, count) in self.buckets.iter().zip(&self.bucket_counts) {
            if value <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
        let _ = self
            .sum
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Observation count.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of observations.
    pub fn sum(&self) -> f64 {
        f64::from_bits(self.sum.load(Ordering::Relaxed))
    }

    /// Mean observation, 0 when empty.
    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() / count as f64
        }
    }

    /// `(upper bound, cumulative count)` pairs.
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.buckets
            .iter()
            .zip(&self.bucket_counts)
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the engine counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub coalesced_waits: u64,
    pub computations: u64,
    pub source_failures: u64,
    pub invalidations: u64,
}

impl MetricsSnapshot {
    /// Fraction of lookups served from cache.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

/// Counters the analytics engine maintains.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Lookups answered from cache
    pub cache_hits: Counter,
    /// Lookups that missed the cache
    pub cache_misses: Counter,
    /// Misses that joined another caller's in-flight computation
    pub coalesced_waits: Counter,
    /// Computations run against the metric source
    pub computations: Counter,
    /// Computations that failed on the metric source
    pub source_failures: Counter,
    /// Explicit invalidations
    pub invalidations: Counter,
    /// Duration of computations, seconds
    pub compute_seconds: Histogram,
}

impl EngineMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            coalesced_waits: self.coalesced_waits.get(),
            computations: self.computations.get(),
            source_failures: self.source_failures.get(),
            invalidations: self.invalidations.get(),
        }
    }

    /// Export in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        let mut output = String::new();
        let counters = [
            ("kpi_cache_hits_total", "KPI lookups served from cache", &self.cache_hits),
            ("kpi_cache_misses_total", "KPI lookups that missed the cache", &self.cache_misses),
            (
                "kpi_coalesced_waits_total",
                "KPI misses that joined an in-flight computation",
                &self.coalesced_waits,
            ),
            ("kpi_computations_total", "KPI computations against the metric source", &self.computations),
            ("kpi_source_failures_total", "KPI computations failed by the metric source", &self.source_failures),
            ("kpi_invalidations_total", "Explicit KPI cache invalidations", &self.invalidations),
        ];

        for (name, help, counter) in counters {
            let _ = writeln!(output, "# HELP {} {}", name, help);
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, counter.get());
        }

        let name = "kpi_compute_seconds";
        let _ = writeln!(output, "# HELP {} KPI computation duration", name);
        let _ = writeln!(output, "# TYPE {} histogram", name);
        for (bound, count) in self.compute_seconds.buckets() {
            let _ = writeln!(output, "{}_bucket{{le=\"{}\"}} {}", name, bound, count);
        }
        let _ = writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", name, self.compute_seconds.count());
        let _ = writeln!(output, "{}_sum {}", name, self.compute_seconds.sum());
        let _ = writeln!(output, "{}_count {}", name, self.compute_seconds.count());

        output
    }
}
