//! Observability: per-lookup IDs, histogram metrics, timing spans.
//! Histograms track p50/p95/p99 for every timing point.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Identifier attached to every lookup and its log lines.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub lookup_id: String,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            lookup_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// A span measuring elapsed time from creation to explicit end.
pub struct TimingSpan {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl TimingSpan {
    pub fn new(name: &'static str, registry: Arc<MetricsRegistry>) -> Self {
        Self {
            name,
            start: Instant::now(),
            registry,
        }
    }

    /// End the span, recording elapsed duration in microseconds.
    pub fn finish(self) -> f64 {
        let elapsed_us = self.start.elapsed().as_micros() as f64;
        self.registry.record(self.name, elapsed_us);
        elapsed_us
    }
}

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        sorted[idx.min(self.count - 1)]
    }
}

/// Histograms for all named metrics.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Keep only the last `ring_capacity` samples per metric.
    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity: ring_capacity.max(1),
        }
    }

    /// Record a sample (in microseconds) for the named metric.
    pub fn record(&self, name: &'static str, value_us: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value_us);
        tracing::debug!(metric = name, value_us, "metric_recorded");
    }

    /// Start a timing span that records on finish.
    pub fn span(self: &Arc<Self>, name: &'static str) -> TimingSpan {
        TimingSpan::new(name, Arc::clone(self))
    }

    /// Percentile for a metric (p in 0-100), in microseconds.
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let hists = self.histograms.lock();
        hists.get(name).map(|ring| ring.percentile(p)).unwrap_or(0.0)
    }

    /// p50/p95/p99 of every metric recorded so far.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        hists
            .iter()
            .map(|(&name, ring)| {
                (
                    name.to_string(),
                    MetricSummary {
                        p50_us: ring.percentile(50.0),
                        p95_us: ring.percentile(95.0),
                        p99_us: ring.percentile(99.0),
                        count: ring.count,
                    },
                )
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub count: usize,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    /// Whole lookup answered from cache.
    pub const LOOKUP_CACHE_HIT: &str = "t_lookup_cache_hit";
    /// Whole lookup that went to the external database.
    pub const LOOKUP_EXTERNAL: &str = "t_lookup_external";
    pub const EXTERNAL_SEARCH: &str = "t_external_search";
    pub const MATCH_SCORING: &str = "t_match_scoring";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_over_samples() {
        let registry = MetricsRegistry::new();
        for v in 1..=100 {
            registry.record(metric_names::EXTERNAL_SEARCH, v as f64);
        }
        assert_eq!(registry.percentile(metric_names::EXTERNAL_SEARCH, 0.0), 1.0);
        assert_eq!(registry.percentile(metric_names::EXTERNAL_SEARCH, 100.0), 100.0);
        let p50 = registry.percentile(metric_names::EXTERNAL_SEARCH, 50.0);
        assert!((50.0..=51.0).contains(&p50));
        assert_eq!(registry.percentile("unknown", 50.0), 0.0);
    }

    #[test]
    fn ring_keeps_latest_samples() {
        let registry = MetricsRegistry::with_capacity(4);
        for v in [1.0, 2.0, 3.0, 4.0, 100.0, 200.0] {
            registry.record(metric_names::MATCH_SCORING, v);
        }
        let summary = registry.summary();
        let s = &summary[metric_names::MATCH_SCORING];
        assert_eq!(s.count, 4);
        assert_eq!(registry.percentile(metric_names::MATCH_SCORING, 0.0), 3.0);
        assert_eq!(s.p99_us, 200.0);
    }

    #[test]
    fn span_records_on_finish() {
        let registry = Arc::new(MetricsRegistry::new());
        let span = registry.span(metric_names::LOOKUP_EXTERNAL);
        let elapsed = span.finish();
        assert!(elapsed >= 0.0);
        assert_eq!(registry.summary()[metric_names::LOOKUP_EXTERNAL].count, 1);
    }

    #[test]
    fn lookup_ids_are_unique() {
        assert_ne!(RequestIds::new().lookup_id, RequestIds::new().lookup_id);
    }
}
