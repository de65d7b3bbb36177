//! Instrumentation for pipeline runs
//!
//! ## Spans
//!
//! One span per stage:
//! - `pipeline.total` - Whole run
//! - `ingest.canonicalize` - Grouping raw samples
//! - `display.resolve` - Display-name resolution
//! - `display.merge` - Merging by display identity
//! - `projection.time_series` / `projection.density` / `projection.table`
//! - `registry.refresh` - Registry snapshot refresh
//!
//! ## Metrics
//!
//! Collected per run: stage durations and dataset counts. The CLI
//! summarizes repeated runs as P50/P95/P99.

pub mod metrics;
pub mod reporter;
pub mod spans;

pub use metrics::*;
pub use reporter::*;
pub use spans::*;
