//! Metrics types for pipeline runs

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Metrics collected for a single pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineMetrics {
    /// Total run duration in microseconds
    pub total_us: u64,
    /// Breakdown by pipeline stage
    pub stages: StageMetrics,
    /// Dataset sizes at each stage
    pub counts: CountMetrics,
}

/// Timing breakdown by pipeline stage, in microseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageMetrics {
    pub canonicalize_us: u64,
    pub resolve_us: u64,
    pub merge_us: u64,
    pub time_series_us: u64,
    pub density_us: u64,
    pub table_us: u64,
}

/// Dataset sizes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountMetrics {
    pub samples_received: usize,
    pub samples_accepted: usize,
    pub samples_dropped: usize,
    pub canonical_groups: usize,
    pub merged_benchmarks: usize,
    /// Benchmarks left after lifecycle filtering
    pub visible_benchmarks: usize,
    pub grid_points: usize,
    pub lifecycle_attached: usize,
}

/// Latency percentiles across multiple runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    /// 50th percentile (median)
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros() as u64
}

/// Builder for collecting metrics during a pipeline run
#[derive(Debug)]
pub struct MetricsCollector {
    start_time: Instant,
    stages: StageMetrics,
    counts: CountMetrics,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            stages: StageMetrics::default(),
            counts: CountMetrics::default(),
        }
    }

    pub fn record_canonicalize(&mut self, duration: Duration) {
        self.stages.canonicalize_us = micros(duration);
    }

    pub fn record_resolve(&mut self, duration: Duration) {
        self.stages.resolve_us = micros(duration);
    }

    pub fn record_merge(&mut self, duration: Duration) {
        self.stages.merge_us = micros(duration);
    }

    pub fn record_time_series(&mut self, duration: Duration) {
        self.stages.time_series_us = micros(duration);
    }

    pub fn record_density(&mut self, duration: Duration) {
        self.stages.density_us = micros(duration);
    }

    pub fn record_table(&mut self, duration: Duration) {
        self.stages.table_us = micros(duration);
    }

    /// Record ingestion counts
    pub fn set_ingest_counts(&mut self, received: usize, accepted: usize, groups: usize) {
        self.counts.samples_received = received;
        self.counts.samples_accepted = accepted;
        self.counts.samples_dropped = received.saturating_sub(accepted);
        self.counts.canonical_groups = groups;
    }

    pub fn set_merged_benchmarks(&mut self, count: usize) {
        self.counts.merged_benchmarks = count;
    }

    pub fn set_visible_benchmarks(&mut self, count: usize) {
        self.counts.visible_benchmarks = count;
    }

    pub fn set_grid_points(&mut self, count: usize) {
        self.counts.grid_points = count;
    }

    pub fn set_lifecycle_attached(&mut self, count: usize) {
        self.counts.lifecycle_attached = count;
    }

    /// Finalize and return the collected metrics
    pub fn finalize(self) -> PipelineMetrics {
        PipelineMetrics {
            total_us: micros(self.start_time.elapsed()),
            stages: self.stages,
            counts: self.counts,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calculate percentiles from a list of durations
pub fn calculate_percentiles(durations: &mut [u64]) -> LatencyPercentiles {
    if durations.is_empty() {
        return LatencyPercentiles::default();
    }

    durations.sort_unstable();
    let len = durations.len();
    let at = |q: f64| durations[((len as f64 * q) as usize).min(len - 1)];

    LatencyPercentiles {
        p50_us: durations[len / 2],
        p95_us: at(0.95),
        p99_us: at(0.99),
    }
}
