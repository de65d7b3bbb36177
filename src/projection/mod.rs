//! Projections over the merged dataset
//!
//! Each projection is a pure function of `&[MergedBenchmark]` and its own
//! parameters, so the pipeline can run them side by side.

pub mod density;
pub mod grid;
pub mod rounding;
pub mod snapshot;
pub mod table;
pub mod timeseries;

pub use density::{
    estimate_density, gaussian_kernel, project_speed_distribution, DensityConfig, DensityPoint,
    SpeedDistributionEntry,
};
pub use grid::{
    build_grid, floor_to_interval, iso_timestamp, TimestampGrid, INTERVALS_PER_DAY,
    INTERVAL_MINUTES, MAX_GRID_POINTS,
};
pub use rounding::{round3, round_sig};
pub use snapshot::{MedianSnapshotSource, SnapshotProfile, SnapshotRecord, SnapshotSource};
pub use table::{effective_status, summarize_table, TableFilter, TableRow};
pub use timeseries::{
    align_nearest, align_resample, project_time_series, validate_series, AlignmentPolicy,
    ProviderSeries, SeriesSegment, TimeSeries, TimeSeriesModel,
};
