//! Pipeline error, options and result types

use std::time::Duration;

use serde::Serialize;

use crate::ingest::IngestReport;
use crate::instrumentation::PipelineMetrics;
use crate::projection::{
    AlignmentPolicy, DensityConfig, SpeedDistributionEntry, TableFilter, TableRow, TimeSeries,
    TimestampGrid,
};

/// Structural errors that fail a whole batch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid day window: {0} (must be at least 1)")]
    InvalidDays(u32),

    #[error("Empty {field} slug for {canonical}")]
    MissingSlug {
        field: &'static str,
        canonical: String,
    },

    #[error("Slug '{slug}' claimed by both '{first}' and '{second}'")]
    SlugCollision {
        slug: String,
        first: String,
        second: String,
    },

    #[error("Series {model}/{provider} has {actual} values, grid has {expected}")]
    SeriesLengthMismatch {
        model: String,
        provider: String,
        expected: usize,
        actual: usize,
    },

    #[error("Real and snapshot segments of {model}/{provider} overlap at index {index}")]
    SegmentOverlap {
        model: String,
        provider: String,
        index: usize,
    },

    #[error("Pipeline run exceeded {0:?}")]
    Timeout(Duration),

    #[error("Projection task failed: {0}")]
    Projection(String),
}

/// Per-run parameters
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Window covered by the time series
    pub days: u32,
    pub alignment: AlignmentPolicy,
    pub filter: TableFilter,
    pub density: DensityConfig,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            days: 7,
            alignment: AlignmentPolicy::default(),
            filter: TableFilter::default(),
            density: DensityConfig::default(),
        }
    }
}

/// The three dashboard projections
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedResult {
    #[serde(rename = "speedDistribution")]
    pub speed_distribution: Vec<SpeedDistributionEntry>,
    #[serde(rename = "timeSeries")]
    pub time_series: TimeSeries,
    pub table: Vec<TableRow>,
}

/// Result plus everything learned while producing it
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub result: CombinedResult,
    pub grid: TimestampGrid,
    pub ingest: IngestReport,
    pub metrics: PipelineMetrics,
}
