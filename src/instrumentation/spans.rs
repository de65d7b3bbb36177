//! Pre-defined tracing spans for consistent instrumentation

use tracing::{span, Level, Span};

/// Span names for all pipeline stages
pub mod span_names {
    pub const PIPELINE_TOTAL: &str = "pipeline.total";
    pub const INGEST_CANONICALIZE: &str = "ingest.canonicalize";
    pub const DISPLAY_RESOLVE: &str = "display.resolve";
    pub const DISPLAY_MERGE: &str = "display.merge";
    pub const PROJECTION_TIME_SERIES: &str = "projection.time_series";
    pub const PROJECTION_DENSITY: &str = "projection.density";
    pub const PROJECTION_TABLE: &str = "projection.table";
    pub const REGISTRY_REFRESH: &str = "registry.refresh";
}

/// Create a span for one whole pipeline run
pub fn pipeline_total_span(samples: usize, days: u32) -> Span {
    span!(Level::INFO, span_names::PIPELINE_TOTAL, samples = %samples, days = %days)
}

/// Create a span for identity canonicalization
pub fn canonicalize_span(samples: usize) -> Span {
    span!(Level::INFO, span_names::INGEST_CANONICALIZE, samples = %samples)
}

/// Create a span for display-name resolution
pub fn display_resolve_span(keys: usize) -> Span {
    span!(Level::INFO, span_names::DISPLAY_RESOLVE, keys = %keys)
}

/// Create a span for merging by display identity
pub fn display_merge_span(groups: usize) -> Span {
    span!(Level::INFO, span_names::DISPLAY_MERGE, groups = %groups)
}

/// Create a span for the time-series projection
pub fn time_series_span(benchmarks: usize, grid_points: usize) -> Span {
    span!(
        Level::INFO,
        span_names::PROJECTION_TIME_SERIES,
        benchmarks = %benchmarks,
        grid_points = %grid_points
    )
}

/// Create a span for density estimation
pub fn density_span(benchmarks: usize) -> Span {
    span!(Level::INFO, span_names::PROJECTION_DENSITY, benchmarks = %benchmarks)
}

/// Create a span for the summary table
pub fn table_span(benchmarks: usize) -> Span {
    span!(Level::INFO, span_names::PROJECTION_TABLE, benchmarks = %benchmarks)
}

/// Create a span for a registry refresh
pub fn registry_refresh_span(generation: u64) -> Span {
    span!(Level::DEBUG, span_names::REGISTRY_REFRESH, generation = %generation)
}
