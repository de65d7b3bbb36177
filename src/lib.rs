//! llm-bench-pipeline - LLM benchmark aggregation
//!
//! Turns a batch of raw benchmark samples (one per inference request) into
//! the three projections a public dashboard renders: a speed distribution,
//! an aligned time series and a summary table.
//!
//! ## Features
//!
//! - **Frozen identities**: upstream `(provider, model)` strings are kept
//!   byte-exact; display names and labels never leak into canonical fields
//! - **Display resolution**: registry cache → static table → canonical id
//! - **Bounded grids**: at most 144 points aligned to 30 minute intervals
//! - **Lifecycle aware**: status filtering and real/snapshot series splits
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use llm_bench_pipeline::{Pipeline, RawSample};
//!
//! # async fn example(samples: Vec<RawSample>) -> Result<(), llm_bench_pipeline::PipelineError> {
//! let pipeline = Pipeline::default();
//! let run = pipeline.run(&samples).await?;
//! println!("{}", serde_json::to_string(&run.result).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod clock;
pub mod display;
pub mod ingest;
pub mod instrumentation;
pub mod lifecycle;
pub mod pipeline;
pub mod projection;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use display::{
    DisplayEntry, DisplayMapper, JsonFileRegistry, MergedBenchmark, ProviderAliases,
    RegistryCache, RegistryDisplayMapper, StaticDisplayTable,
};
pub use ingest::{canonicalize, CanonicalAggregate, CanonicalKey, IngestReport, RawSample};
pub use lifecycle::{LifecycleAnnotation, LifecycleIndex, LifecycleStatus};
pub use pipeline::{CombinedResult, Pipeline, PipelineError, PipelineOptions, PipelineRun};
pub use projection::{
    build_grid, AlignmentPolicy, DensityConfig, SnapshotSource, TableFilter, TimestampGrid,
};
