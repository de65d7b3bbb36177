//! Time-series projection onto the shared grid
//!
//! Each merged benchmark becomes one provider series whose `values` array
//! is exactly as long as the grid. Benchmarks are grouped into models by
//! display name.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::grid::TimestampGrid;
use super::rounding::round3;
use super::snapshot::{SnapshotProfile, SnapshotSource};
use crate::display::MergedBenchmark;
use crate::pipeline::PipelineError;

pub const DEFAULT_NEAREST_TOLERANCE_MINUTES: i64 = 5;

/// How samples are placed on grid slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlignmentPolicy {
    /// Subsample or right-align by index, ignoring sample timestamps
    #[default]
    Resample,
    /// Each slot takes the sample closest in time, within `tolerance`
    NearestTimestamp { tolerance: Duration },
}

impl AlignmentPolicy {
    pub fn nearest_default() -> Self {
        AlignmentPolicy::NearestTimestamp {
            tolerance: Duration::minutes(DEFAULT_NEAREST_TOLERANCE_MINUTES),
        }
    }
}

/// Part of a deprecated provider's history a series carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesSegment {
    Real,
    Snapshot,
}

/// One provider line of a model chart
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderSeries {
    pub provider: String,
    #[serde(rename = "providerCanonical")]
    pub provider_canonical: String,
    pub values: Vec<Option<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<SeriesSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_points: Option<Vec<Option<SnapshotProfile>>>,
}

/// All provider lines sharing one display name
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeriesModel {
    pub model_name: String,
    pub display_name: String,
    pub providers: Vec<ProviderSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub timestamps: Vec<String>,
    pub models: Vec<TimeSeriesModel>,
}

/// Index-based alignment of time-ordered values onto `slots` positions
pub fn align_resample(values: &[f64], slots: usize) -> Vec<Option<f64>> {
    let len = values.len();
    if len == 0 {
        return vec![None; slots];
    }
    if len >= slots {
        // Subsample; len == slots degenerates to 1:1
        return (0..slots).map(|i| Some(values[i * len / slots])).collect();
    }
    let mut aligned = vec![None; slots - len];
    aligned.extend(values.iter().copied().map(Some));
    aligned
}

/// Timestamp-based alignment: nearest sample within `tolerance` per slot
///
/// `samples` must be ordered by time. Ties go to the later sample.
pub fn align_nearest(
    samples: &[(DateTime<Utc>, f64)],
    slots: &[DateTime<Utc>],
    tolerance: Duration,
) -> Vec<Option<f64>> {
    slots
        .iter()
        .map(|slot| {
            let after = samples.partition_point(|(ts, _)| ts < slot);
            let candidates = [after.checked_sub(1), Some(after)];
            candidates
                .into_iter()
                .flatten()
                .filter_map(|i| samples.get(i))
                .map(|(ts, value)| ((*ts - *slot).abs(), *value))
                .filter(|(distance, _)| *distance <= tolerance)
                .reduce(|best, next| if next.0 <= best.0 { next } else { best })
                .map(|(_, value)| value)
        })
        .collect()
}

fn align(benchmark: &MergedBenchmark, grid: &TimestampGrid, policy: AlignmentPolicy) -> Vec<Option<f64>> {
    match policy {
        AlignmentPolicy::Resample => align_resample(benchmark.tokens_per_second(), grid.len()),
        AlignmentPolicy::NearestTimestamp { tolerance } => {
            let samples: Vec<_> = benchmark.samples().collect();
            align_nearest(&samples, grid.timestamps(), tolerance)
        }
    }
}

/// Real segment of a split series
///
/// Only samples taken at or before `cutoff` count, and they are placed on
/// slots `0..=boundary` so the newest one lands on the boundary. Later
/// slots stay empty.
fn align_until(
    benchmark: &MergedBenchmark,
    grid: &TimestampGrid,
    policy: AlignmentPolicy,
    cutoff: DateTime<Utc>,
    boundary: usize,
) -> Vec<Option<f64>> {
    let samples: Vec<_> = benchmark.samples().filter(|(ts, _)| *ts <= cutoff).collect();
    let slots = &grid.timestamps()[..=boundary];

    let mut values = match policy {
        AlignmentPolicy::Resample => {
            let throughput: Vec<f64> = samples.iter().map(|(_, tps)| *tps).collect();
            align_resample(&throughput, slots.len())
        }
        AlignmentPolicy::NearestTimestamp { tolerance } => align_nearest(&samples, slots, tolerance),
    };
    values.resize(grid.len(), None);
    values
}

fn rounded(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    values.into_iter().map(|v| v.map(round3)).collect()
}

/// Series for one benchmark: one line, or a real/snapshot pair
fn provider_series(
    benchmark: &MergedBenchmark,
    grid: &TimestampGrid,
    policy: AlignmentPolicy,
    snapshots: &dyn SnapshotSource,
) -> Vec<ProviderSeries> {
    let deprecated = benchmark.deprecated.then_some(true);

    // Only a deprecated row splits; live rows ignore any stray date
    let split = benchmark
        .deprecation_date
        .filter(|_| benchmark.deprecated)
        .filter(|date| grid.strictly_contains(*date))
        .and_then(|date| grid.last_slot_at_or_before(date).map(|boundary| (date, boundary)))
        .and_then(|(date, boundary)| {
            snapshots
                .profile(benchmark.primary_key())
                .map(|profile| (date, boundary, profile))
        });

    let Some((date, boundary, profile)) = split else {
        return vec![ProviderSeries {
            provider: benchmark.provider.clone(),
            provider_canonical: benchmark.provider_canonical().to_string(),
            values: rounded(align(benchmark, grid, policy)),
            deprecated,
            segment: None,
            snapshot_points: None,
        }];
    };

    let real = align_until(benchmark, grid, policy, date, boundary);

    let mut synthetic = Vec::with_capacity(grid.len());
    let mut points = Vec::with_capacity(grid.len());
    for (i, slot) in grid.timestamps().iter().enumerate() {
        if i <= boundary {
            synthetic.push(None);
            points.push(None);
        } else {
            synthetic.push(Some(snapshots.value_at(&profile, *slot)));
            points.push(Some(profile.rounded()));
        }
    }

    tracing::debug!(
        "Split {} at slot {} of {} into real and snapshot segments",
        benchmark.primary_key(),
        boundary,
        grid.len()
    );

    vec![
        ProviderSeries {
            provider: benchmark.provider.clone(),
            provider_canonical: benchmark.provider_canonical().to_string(),
            values: rounded(real),
            deprecated,
            segment: Some(SeriesSegment::Real),
            snapshot_points: None,
        },
        ProviderSeries {
            provider: benchmark.provider.clone(),
            provider_canonical: benchmark.provider_canonical().to_string(),
            values: rounded(synthetic),
            deprecated,
            segment: Some(SeriesSegment::Snapshot),
            snapshot_points: Some(points),
        },
    ]
}

/// Project merged benchmarks onto the grid
///
/// Models are ordered by display name; providers keep benchmark order.
pub fn project_time_series(
    grid: &TimestampGrid,
    benchmarks: &[MergedBenchmark],
    policy: AlignmentPolicy,
    snapshots: &dyn SnapshotSource,
) -> Result<TimeSeries, PipelineError> {
    let mut models: BTreeMap<&str, TimeSeriesModel> = BTreeMap::new();

    for benchmark in benchmarks {
        let model = models
            .entry(benchmark.display_name.as_str())
            .or_insert_with(|| TimeSeriesModel {
                model_name: benchmark.model_canonical().to_string(),
                display_name: benchmark.display_name.clone(),
                providers: Vec::new(),
            });
        model
            .providers
            .extend(provider_series(benchmark, grid, policy, snapshots));
    }

    let series = TimeSeries {
        timestamps: grid.iso_strings(),
        models: models.into_values().collect(),
    };
    validate_series(&series)?;
    Ok(series)
}

/// Structural checks applied to every projected time series
///
/// Every `values` array must match the grid, and a real/snapshot pair for
/// one provider must never both carry a value at the same index.
pub fn validate_series(series: &TimeSeries) -> Result<(), PipelineError> {
    let expected = series.timestamps.len();

    for model in &series.models {
        for provider in &model.providers {
            if provider.values.len() != expected {
                return Err(PipelineError::SeriesLengthMismatch {
                    model: model.display_name.clone(),
                    provider: provider.provider_canonical.clone(),
                    expected,
                    actual: provider.values.len(),
                });
            }
        }

        let segments = |segment: SeriesSegment| {
            model
                .providers
                .iter()
                .filter(move |p| p.segment == Some(segment))
        };
        for real in segments(SeriesSegment::Real) {
            for snapshot in segments(SeriesSegment::Snapshot)
                .filter(|s| s.provider_canonical == real.provider_canonical)
            {
                let overlap = real
                    .values
                    .iter()
                    .zip(&snapshot.values)
                    .position(|(r, s)| r.is_some() && s.is_some());
                if let Some(index) = overlap {
                    return Err(PipelineError::SegmentOverlap {
                        model: model.display_name.clone(),
                        provider: real.provider_canonical.clone(),
                        index,
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::{merge_aggregates, DisplayEntry, ProviderAliases};
    use crate::ingest::{canonicalize, CanonicalKey, RawSample};
    use crate::projection::grid::build_grid;
    use crate::projection::snapshot::MedianSnapshotSource;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, 12, 0, 0).unwrap()
    }

    fn benchmarks(samples: &[RawSample], entries: &HashMap<CanonicalKey, DisplayEntry>) -> Vec<MergedBenchmark> {
        let (aggregates, _) = canonicalize(samples);
        merge_aggregates(&aggregates, entries, &ProviderAliases::default())
    }

    fn hourly(provider: &str, model: &str, count: i64) -> Vec<RawSample> {
        (0..count)
            .map(|i| {
                RawSample::new(
                    provider,
                    model,
                    10.0 + i as f64,
                    None,
                    now() - Duration::hours(count - 1 - i),
                )
            })
            .collect()
    }

    #[test]
    fn test_resample_shapes() {
        assert_eq!(align_resample(&[], 3), vec![None, None, None]);
        assert_eq!(align_resample(&[1.0, 2.0], 4), vec![None, None, Some(1.0), Some(2.0)]);
        assert_eq!(
            align_resample(&[1.0, 2.0, 3.0], 3),
            vec![Some(1.0), Some(2.0), Some(3.0)]
        );
        assert_eq!(
            align_resample(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3),
            vec![Some(1.0), Some(3.0), Some(5.0)]
        );
    }

    #[test]
    fn test_nearest_respects_tolerance() {
        let t0 = now();
        let slots = [t0, t0 + Duration::minutes(30), t0 + Duration::minutes(60)];
        let samples = [
            (t0 + Duration::minutes(2), 1.0),
            (t0 + Duration::minutes(58), 2.0),
            (t0 + Duration::minutes(62), 3.0),
        ];
        let aligned = align_nearest(&samples, &slots, Duration::minutes(5));
        assert_eq!(aligned, vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_every_series_matches_grid() {
        let grid = build_grid(7, now()).unwrap();
        let mut samples = hourly("openai", "gpt-4", 500);
        samples.extend(hourly("vertex", "gemini-1.5-pro", 3));
        samples.extend(hourly("anthropic", "claude-3-haiku", 112));
        let merged = benchmarks(&samples, &HashMap::new());

        for policy in [AlignmentPolicy::Resample, AlignmentPolicy::nearest_default()] {
            let series =
                project_time_series(&grid, &merged, policy, &MedianSnapshotSource::new()).unwrap();
            assert_eq!(series.timestamps.len(), grid.len());
            assert_eq!(series.models.len(), 3);
            for model in &series.models {
                for provider in &model.providers {
                    assert_eq!(provider.values.len(), grid.len());
                }
            }
        }
    }

    #[test]
    fn test_right_aligned_sparse_series() {
        let grid = build_grid(1, now()).unwrap();
        let merged = benchmarks(&hourly("vertex", "gemini-1.5-pro", 3), &HashMap::new());
        let series =
            project_time_series(&grid, &merged, AlignmentPolicy::Resample, &MedianSnapshotSource::new())
                .unwrap();

        let provider = &series.models[0].providers[0];
        assert_eq!(provider.provider, "google");
        assert_eq!(provider.provider_canonical, "vertex");
        assert_eq!(provider.values.iter().filter(|v| v.is_some()).count(), 3);
        assert_eq!(provider.values.last(), Some(&Some(12.0)));
        assert!(provider.segment.is_none());
    }

    #[test]
    fn test_deprecated_split_has_no_gap_or_overlap() {
        let grid = build_grid(7, now()).unwrap();
        let key = CanonicalKey::new("openai", "gpt-4-0314");
        let deprecated_at = now() - Duration::days(2);

        let mut entries = HashMap::new();
        entries.insert(
            key.clone(),
            DisplayEntry {
                display_name: "gpt-4".into(),
                deprecated: true,
                deprecation_date: Some(deprecated_at),
                successor_model: None,
            },
        );
        let merged = benchmarks(&hourly("openai", "gpt-4-0314", 400), &entries);

        let mut snapshots = MedianSnapshotSource::new();
        snapshots.insert(
            key,
            SnapshotProfile {
                p10: 20.0,
                p50: 25.0,
                p90: 30.0,
                sampling_period_days: 14,
                sample_size: 336,
            },
        );

        let series =
            project_time_series(&grid, &merged, AlignmentPolicy::Resample, &snapshots).unwrap();
        let providers = &series.models[0].providers;
        assert_eq!(providers.len(), 2);

        let real = &providers[0];
        let snapshot = &providers[1];
        assert_eq!(real.segment, Some(SeriesSegment::Real));
        assert_eq!(snapshot.segment, Some(SeriesSegment::Snapshot));
        assert_eq!(real.deprecated, Some(true));

        let boundary = grid.last_slot_at_or_before(deprecated_at).unwrap();
        for i in 0..grid.len() {
            assert!(!(real.values[i].is_some() && snapshot.values[i].is_some()));
            if i > boundary {
                assert_eq!(snapshot.values[i], Some(25.0));
            } else {
                assert!(snapshot.values[i].is_none());
            }
        }
        assert!(real.values[boundary].is_some());
        let points = snapshot.snapshot_points.as_ref().unwrap();
        assert_eq!(points[boundary + 1].map(|p| p.sample_size), Some(336));
    }

    fn deprecated_gpt4(
        deprecated_at: DateTime<Utc>,
    ) -> (HashMap<CanonicalKey, DisplayEntry>, MedianSnapshotSource) {
        let key = CanonicalKey::new("openai", "gpt-4-0314");
        let mut entries = HashMap::new();
        entries.insert(
            key.clone(),
            DisplayEntry {
                display_name: "gpt-4".into(),
                deprecated: true,
                deprecation_date: Some(deprecated_at),
                successor_model: None,
            },
        );
        let mut snapshots = MedianSnapshotSource::new();
        snapshots.insert(
            key,
            SnapshotProfile {
                p10: 900.0,
                p50: 999.0,
                p90: 1100.0,
                sampling_period_days: 14,
                sample_size: 120,
            },
        );
        (entries, snapshots)
    }

    #[test]
    fn test_real_segment_keeps_newest_samples_before_deprecation() {
        let grid = build_grid(7, now()).unwrap();
        let deprecated_at = now() - Duration::days(2);
        let boundary = grid.last_slot_at_or_before(deprecated_at).unwrap();
        let (entries, snapshots) = deprecated_gpt4(deprecated_at);

        // Samples stop exactly at the deprecation date
        let samples: Vec<RawSample> = (0..120)
            .map(|i| {
                RawSample::new(
                    "openai",
                    "gpt-4-0314",
                    10.0 + i as f64,
                    None,
                    deprecated_at - Duration::hours(119 - i),
                )
            })
            .collect();
        let merged = benchmarks(&samples, &entries);

        let resampled =
            project_time_series(&grid, &merged, AlignmentPolicy::Resample, &snapshots).unwrap();
        let real = &resampled.models[0].providers[0];
        assert_eq!(real.segment, Some(SeriesSegment::Real));
        assert!(real.values[..=boundary].iter().all(|v| v.is_some()));
        assert!(real.values[boundary + 1..].iter().all(|v| v.is_none()));
        let newest = real.values[boundary].unwrap();
        assert!(newest >= 128.0, "newest real value was {}", newest);

        let nearest =
            project_time_series(&grid, &merged, AlignmentPolicy::nearest_default(), &snapshots)
                .unwrap();
        let real = &nearest.models[0].providers[0];
        assert_eq!(real.values[boundary], Some(129.0));
        assert!(real.values[boundary + 1..].iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_live_row_with_deprecated_spelling_does_not_split() {
        let grid = build_grid(7, now()).unwrap();
        let deprecated_at = now() - Duration::days(3);
        let (mut entries, mut snapshots) = deprecated_gpt4(deprecated_at);
        entries.insert(
            CanonicalKey::new("openai", "gpt-4-0613"),
            DisplayEntry {
                display_name: "gpt-4".into(),
                deprecated: false,
                deprecation_date: None,
                successor_model: None,
            },
        );
        if let Some(profile) = snapshots.profile(&CanonicalKey::new("openai", "gpt-4-0314")) {
            snapshots.insert(CanonicalKey::new("openai", "gpt-4-0613"), profile);
        }

        let mut samples: Vec<RawSample> = (0..24)
            .map(|i| {
                let ts = deprecated_at - Duration::hours(i);
                RawSample::new("openai", "gpt-4-0314", 20.0, None, ts)
            })
            .collect();
        samples.extend((0..24).map(|i| {
            RawSample::new("openai", "gpt-4-0613", 50.0, None, now() - Duration::hours(i))
        }));
        let merged = benchmarks(&samples, &entries);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].deprecated);

        let series =
            project_time_series(&grid, &merged, AlignmentPolicy::Resample, &snapshots).unwrap();
        let providers = &series.models[0].providers;
        assert_eq!(providers.len(), 1);
        assert!(providers[0].segment.is_none());
        assert!(providers[0].deprecated.is_none());
        assert_eq!(providers[0].values.last(), Some(&Some(50.0)));
        assert!(!providers[0].values.contains(&Some(999.0)));
    }

    #[test]
    fn test_deprecated_without_profile_stays_single() {
        let grid = build_grid(7, now()).unwrap();
        let mut entries = HashMap::new();
        entries.insert(
            CanonicalKey::new("openai", "gpt-4-0314"),
            DisplayEntry {
                display_name: "gpt-4".into(),
                deprecated: true,
                deprecation_date: Some(now() - Duration::days(2)),
                successor_model: None,
            },
        );
        let merged = benchmarks(&hourly("openai", "gpt-4-0314", 10), &entries);
        let series =
            project_time_series(&grid, &merged, AlignmentPolicy::Resample, &MedianSnapshotSource::new())
                .unwrap();
        assert_eq!(series.models[0].providers.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_lengths() {
        let series = TimeSeries {
            timestamps: vec!["a".into(), "b".into()],
            models: vec![TimeSeriesModel {
                model_name: "m".into(),
                display_name: "m".into(),
                providers: vec![ProviderSeries {
                    provider: "p".into(),
                    provider_canonical: "p".into(),
                    values: vec![Some(1.0)],
                    deprecated: None,
                    segment: None,
                    snapshot_points: None,
                }],
            }],
        };
        assert!(matches!(
            validate_series(&series),
            Err(PipelineError::SeriesLengthMismatch { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_validation_rejects_overlap() {
        let line = |segment, values: Vec<Option<f64>>| ProviderSeries {
            provider: "p".into(),
            provider_canonical: "p".into(),
            values,
            deprecated: Some(true),
            segment: Some(segment),
            snapshot_points: None,
        };
        let series = TimeSeries {
            timestamps: vec!["a".into(), "b".into()],
            models: vec![TimeSeriesModel {
                model_name: "m".into(),
                display_name: "m".into(),
                providers: vec![
                    line(SeriesSegment::Real, vec![Some(1.0), Some(2.0)]),
                    line(SeriesSegment::Snapshot, vec![None, Some(2.0)]),
                ],
            }],
        };
        assert!(matches!(
            validate_series(&series),
            Err(PipelineError::SegmentOverlap { index: 1, .. })
        ));
    }
}
