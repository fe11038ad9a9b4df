//! Observability: timing histograms and pipeline counters.
//! Histograms track p50/p95/p99 over a bounded sample window; counters are
//! cumulative for the lifetime of the owning `Enhancer`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Fresh id attached to the tracing span of each `enhance` call.
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    /// End the span, recording elapsed duration in milliseconds.
    pub fn finish(self) -> f64 {
        let elapsed_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.registry.record(self.name, elapsed_ms);
        elapsed_ms
    }
}

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
        }
    }

    fn push(&mut self, value: f64) {
        let capacity = self.samples.len();
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

#[derive(Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    dedup_joins: AtomicU64,
    transport_attempts: AtomicU64,
    translations: AtomicU64,
}

/// Named pipeline events counted by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    CacheHit,
    CacheMiss,
    DedupJoin,
    TransportAttempt,
    Translation,
}

pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    counters: Counters,
    ring_capacity: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            ring_capacity: 1024,
        }
    }

    /// Record a sample (in milliseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_ms: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value_ms);
        tracing::debug!(metric = name, value_ms, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn incr(&self, counter: Counter) {
        self.counter_cell(counter).fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, counter: Counter) -> u64 {
        self.counter_cell(counter).load(Ordering::Relaxed)
    }

    fn counter_cell(&self, counter: Counter) -> &AtomicU64 {
        match counter {
            Counter::CacheHit => &self.counters.cache_hits,
            Counter::CacheMiss => &self.counters.cache_misses,
            Counter::DedupJoin => &self.counters.dedup_joins,
            Counter::TransportAttempt => &self.counters.transport_attempts,
            Counter::Translation => &self.counters.translations,
        }
    }

    /// Fraction of cache lookups that hit, 0.0 when nothing was looked up yet.
    pub fn cache_hit_rate(&self) -> f64 {
        let hits = self.count(Counter::CacheHit);
        let misses = self.count(Counter::CacheMiss);
        if hits + misses == 0 {
            0.0
        } else {
            hits as f64 / (hits + misses) as f64
        }
    }

    /// Generate a summary of all timing metrics at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        hists
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_ms: ring.percentile(50.0),
                        p95_ms: ring.percentile(95.0),
                        p99_ms: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const ENHANCE_TOTAL: &str = "t_enhance_total";
    pub const TRANSPORT_CALL: &str = "t_transport_call";
    pub const TRANSLATION: &str = "t_translation";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_recorded_samples() {
        let registry = MetricsRegistry::new();
        for v in 1..=100 {
            registry.record(metric_names::ENHANCE_TOTAL, v as f64);
        }
        let summary = registry.summary();
        let s = &summary[metric_names::ENHANCE_TOTAL];
        assert_eq!(s.count, 100);
        assert!((s.p50_ms - 51.0).abs() < 1.0);
        assert_eq!(s.p99_ms, 99.0);
    }

    #[test]
    fn hit_rate_tracks_counters() {
        let registry = MetricsRegistry::new();
        assert_eq!(registry.cache_hit_rate(), 0.0);
        registry.incr(Counter::CacheMiss);
        registry.incr(Counter::CacheHit);
        registry.incr(Counter::CacheHit);
        registry.incr(Counter::CacheHit);
        assert_eq!(registry.count(Counter::CacheHit), 3);
        assert!((registry.cache_hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
