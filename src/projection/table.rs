//! Flat summary table and lifecycle filtering

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::rounding::round3;
use crate::display::MergedBenchmark;
use crate::lifecycle::LifecycleStatus;
use crate::pipeline::PipelineError;

/// Which rows (and series) are visible
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFilter {
    /// Keep only these statuses; `None` keeps everything
    #[serde(default)]
    pub allowed_statuses: Option<HashSet<LifecycleStatus>>,
    /// Drop rows whose status is flagged
    #[serde(default)]
    pub hide_flagged: bool,
}

impl TableFilter {
    pub fn hide_flagged() -> Self {
        Self {
            allowed_statuses: None,
            hide_flagged: true,
        }
    }

    pub fn allowing(statuses: impl IntoIterator<Item = LifecycleStatus>) -> Self {
        Self {
            allowed_statuses: Some(statuses.into_iter().collect()),
            hide_flagged: false,
        }
    }

    pub fn admits(&self, status: LifecycleStatus) -> bool {
        if self.hide_flagged && status.is_flagged() {
            return false;
        }
        self.allowed_statuses
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&status))
    }

    /// Benchmarks whose effective status passes the filter
    pub fn apply<'a>(&self, benchmarks: &'a [MergedBenchmark]) -> Vec<&'a MergedBenchmark> {
        benchmarks
            .iter()
            .filter(|b| self.admits(effective_status(b)))
            .collect()
    }
}

/// Annotation status, else `deprecated` when flagged by the registry, else `active`
pub fn effective_status(benchmark: &MergedBenchmark) -> LifecycleStatus {
    match benchmark.lifecycle() {
        Some(annotation) => annotation.status,
        None if benchmark.deprecated => LifecycleStatus::Deprecated,
        None => LifecycleStatus::Active,
    }
}

/// One table row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub provider: String,
    #[serde(rename = "providerCanonical")]
    pub provider_canonical: String,
    #[serde(rename = "providerSlug")]
    pub provider_slug: String,
    pub model_name: String,
    #[serde(rename = "modelCanonical")]
    pub model_canonical: String,
    #[serde(rename = "modelSlug")]
    pub model_slug: String,
    pub display_name: String,
    pub tokens_per_second_mean: f64,
    pub tokens_per_second_min: f64,
    pub tokens_per_second_max: f64,
    pub time_to_first_token_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle_status: Option<LifecycleStatus>,
    pub deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_benchmark_at: Option<DateTime<Utc>>,
}

fn to_row(benchmark: &MergedBenchmark) -> Result<TableRow, PipelineError> {
    for (field, slug) in [
        ("provider", benchmark.provider_slug()),
        ("model", benchmark.model_slug()),
    ] {
        if slug.is_empty() {
            return Err(PipelineError::MissingSlug {
                field,
                canonical: benchmark.primary_key().to_string(),
            });
        }
    }

    Ok(TableRow {
        provider: benchmark.provider.clone(),
        provider_canonical: benchmark.provider_canonical().to_string(),
        provider_slug: benchmark.provider_slug().to_string(),
        model_name: benchmark.display_name.clone(),
        model_canonical: benchmark.model_canonical().to_string(),
        model_slug: benchmark.model_slug().to_string(),
        display_name: benchmark.display_name.clone(),
        tokens_per_second_mean: round3(benchmark.stats.tokens_per_second_mean),
        tokens_per_second_min: round3(benchmark.stats.tokens_per_second_min),
        tokens_per_second_max: round3(benchmark.stats.tokens_per_second_max),
        time_to_first_token_mean: benchmark.stats.time_to_first_token_mean.map(round3),
        lifecycle_status: benchmark.lifecycle().map(|a| a.status),
        deprecated: benchmark.deprecated,
        last_benchmark_at: benchmark.last_benchmark_at,
    })
}

/// Build the table
///
/// Every row is checked for slugs before filtering, so a hidden row with a
/// missing slug still fails the batch.
pub fn summarize_table(
    benchmarks: &[MergedBenchmark],
    filter: &TableFilter,
) -> Result<Vec<TableRow>, PipelineError> {
    let mut rows = Vec::with_capacity(benchmarks.len());
    for benchmark in benchmarks {
        let row = to_row(benchmark)?;
        if filter.admits(effective_status(benchmark)) {
            rows.push(row);
        }
    }
    tracing::debug!("Table: {} of {} rows visible", rows.len(), benchmarks.len());
    Ok(rows)
}
