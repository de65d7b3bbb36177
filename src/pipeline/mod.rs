//! Batch pipeline
//!
//! ```text
//! RawSample[]
//!     │ canonicalize
//!     ▼
//! CanonicalAggregate[] ── resolve ──▶ display entries
//!     │ merge + lifecycle + last runs
//!     ▼
//! MergedBenchmark[] ──┬─▶ time series (grid)
//!                     ├─▶ speed distribution
//!                     └─▶ table
//! ```
//!
//! The three projections read the same merged slice and run side by side
//! on the rayon pool, dispatched from tokio's blocking pool so the runtime
//! workers stay free.

pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::Instrument;

use crate::clock::{Clock, SystemClock};
use crate::display::{
    check_slug_collisions, merge_aggregates, resolve_last_runs, DisplayEntry, DisplayMapper,
    LastRunLookup, MergedBenchmark, ProviderAliases, Resolution, ResolutionSource,
    StaticDisplayTable,
};
use crate::ingest::{canonicalize, CanonicalAggregate, CanonicalKey, RawSample};
use crate::instrumentation::{
    canonicalize_span, density_span, display_merge_span, display_resolve_span,
    pipeline_total_span, table_span, time_series_span, MetricsCollector,
};
use crate::lifecycle::LifecycleIndex;
use crate::projection::{
    build_grid, project_speed_distribution, project_time_series, summarize_table,
    MedianSnapshotSource, SnapshotSource, TimestampGrid,
};

pub use types::{CombinedResult, PipelineError, PipelineOptions, PipelineRun};

/// Configured pipeline; cheap to run repeatedly
pub struct Pipeline {
    mapper: Arc<dyn DisplayMapper>,
    aliases: ProviderAliases,
    lifecycle: LifecycleIndex,
    snapshots: Arc<dyn SnapshotSource>,
    last_runs: Option<Arc<dyn LastRunLookup>>,
    clock: Arc<dyn Clock>,
    options: PipelineOptions,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(Arc::new(StaticDisplayTable::builtin()))
    }
}

impl Pipeline {
    /// Pipeline resolving display names through `mapper`
    pub fn new(mapper: Arc<dyn DisplayMapper>) -> Self {
        Self {
            mapper,
            aliases: ProviderAliases::default(),
            lifecycle: LifecycleIndex::new(),
            snapshots: Arc::new(MedianSnapshotSource::new()),
            last_runs: None,
            clock: Arc::new(SystemClock),
            options: PipelineOptions::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: ProviderAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_lifecycle(mut self, lifecycle: LifecycleIndex) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    pub fn with_snapshots(mut self, snapshots: Arc<dyn SnapshotSource>) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_last_run_lookup(mut self, lookup: Arc<dyn LastRunLookup>) -> Self {
        self.last_runs = Some(lookup);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the whole batch
    pub async fn run(&self, samples: &[RawSample]) -> Result<PipelineRun, PipelineError> {
        let now = self.clock.now();
        let span = pipeline_total_span(samples.len(), self.options.days);
        self.run_at(samples, now).instrument(span).await
    }

    /// [`Self::run`] bounded by `timeout`
    pub async fn run_with_timeout(
        &self,
        samples: &[RawSample],
        timeout: Duration,
    ) -> Result<PipelineRun, PipelineError> {
        tokio::time::timeout(timeout, self.run(samples))
            .await
            .map_err(|_| PipelineError::Timeout(timeout))?
    }

    async fn run_at(
        &self,
        samples: &[RawSample],
        now: DateTime<Utc>,
    ) -> Result<PipelineRun, PipelineError> {
        let mut metrics = MetricsCollector::new();
        let grid = build_grid(self.options.days, now)?;
        metrics.set_grid_points(grid.len());

        let started = Instant::now();
        let (aggregates, ingest) =
            canonicalize_span(samples.len()).in_scope(|| canonicalize(samples));
        metrics.record_canonicalize(started.elapsed());
        metrics.set_ingest_counts(ingest.received, ingest.accepted, ingest.groups);
        if ingest.dropped() > 0 {
            tracing::debug!(
                "Dropped {} samples ({} missing identity, {} invalid throughput, {} missing timestamp)",
                ingest.dropped(),
                ingest.dropped_missing_identity,
                ingest.dropped_invalid_throughput,
                ingest.dropped_missing_timestamp
            );
        }

        let started = Instant::now();
        let entries = self
            .resolve_entries(&aggregates)
            .instrument(display_resolve_span(aggregates.len()))
            .await;
        metrics.record_resolve(started.elapsed());

        let started = Instant::now();
        let mut merged = display_merge_span(aggregates.len())
            .in_scope(|| merge_aggregates(&aggregates, &entries, &self.aliases));
        check_slug_collisions(&merged)?;
        metrics.set_lifecycle_attached(self.lifecycle.attach(&mut merged));
        resolve_last_runs(&mut merged, self.last_runs.as_deref()).await;
        metrics.record_merge(started.elapsed());
        metrics.set_merged_benchmarks(merged.len());

        let (result, metrics) = self.project_blocking(grid.clone(), merged, metrics).await?;

        let metrics = metrics.finalize();
        tracing::info!(
            "Pipeline finished: {} samples -> {} benchmarks ({} visible) in {}us",
            ingest.received,
            metrics.counts.merged_benchmarks,
            metrics.counts.visible_benchmarks,
            metrics.total_us
        );

        Ok(PipelineRun {
            result,
            grid,
            ingest,
            metrics,
        })
    }

    /// Resolve display entries for every aggregate
    ///
    /// A sample-supplied display label is used only when no resolver had an
    /// entry for the key.
    async fn resolve_entries(
        &self,
        aggregates: &[CanonicalAggregate],
    ) -> HashMap<CanonicalKey, DisplayEntry> {
        let keys: Vec<CanonicalKey> = aggregates.iter().map(|a| a.key().clone()).collect();
        let mut resolutions = self.mapper.resolve_all(&keys).await;

        let mut by_source: HashMap<ResolutionSource, usize> = HashMap::new();
        let mut entries = HashMap::with_capacity(aggregates.len());
        for aggregate in aggregates {
            let mut resolution = resolutions
                .remove(aggregate.key())
                .unwrap_or_else(|| Resolution::canonical(aggregate.key()));
            if resolution.source == ResolutionSource::Canonical {
                if let Some(hint) = aggregate.display_hint() {
                    resolution.entry.display_name = hint.to_string();
                    resolution.source = ResolutionSource::SampleHint;
                }
            }
            *by_source.entry(resolution.source).or_default() += 1;
            entries.insert(aggregate.key().clone(), resolution.entry);
        }

        tracing::debug!("Display names resolved: {:?}", by_source);
        entries
    }

    /// [`project`] on the blocking pool
    async fn project_blocking(
        &self,
        grid: TimestampGrid,
        merged: Vec<MergedBenchmark>,
        mut metrics: MetricsCollector,
    ) -> Result<(CombinedResult, MetricsCollector), PipelineError> {
        let options = self.options.clone();
        let snapshots = Arc::clone(&self.snapshots);
        let span = tracing::Span::current();

        tokio::task::spawn_blocking(move || {
            span.in_scope(|| {
                project(&options, snapshots.as_ref(), &grid, &merged, &mut metrics)
                    .map(|result| (result, metrics))
            })
        })
        .await
        .map_err(|e| PipelineError::Projection(e.to_string()))?
    }
}

/// Run the three projections over the merged rows
///
/// The filter is applied once; time series and speed distribution see
/// only visible rows, the table validates every row and then filters.
/// CPU bound: call from a blocking context.
pub fn project(
    options: &PipelineOptions,
    snapshots: &dyn SnapshotSource,
    grid: &TimestampGrid,
    merged: &[MergedBenchmark],
    metrics: &mut MetricsCollector,
) -> Result<CombinedResult, PipelineError> {
    let visible: Vec<MergedBenchmark> = options
        .filter
        .apply(merged)
        .into_iter()
        .cloned()
        .collect();
    metrics.set_visible_benchmarks(visible.len());

    let (series, (distribution, table)) = rayon::join(
        || {
            time_series_span(visible.len(), grid.len()).in_scope(|| {
                let started = Instant::now();
                let series = project_time_series(grid, &visible, options.alignment, snapshots);
                (series, started.elapsed())
            })
        },
        || {
            rayon::join(
                || {
                    density_span(visible.len()).in_scope(|| {
                        let started = Instant::now();
                        let distribution = project_speed_distribution(&visible, &options.density);
                        (distribution, started.elapsed())
                    })
                },
                || {
                    table_span(merged.len()).in_scope(|| {
                        let started = Instant::now();
                        let table = summarize_table(merged, &options.filter);
                        (table, started.elapsed())
                    })
                },
            )
        },
    );

    metrics.record_time_series(series.1);
    metrics.record_density(distribution.1);
    metrics.record_table(table.1);

    Ok(CombinedResult {
        speed_distribution: distribution.0,
        time_series: series.0?,
        table: table.0?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::display::{
        RegistryCache, RegistryCacheConfig, RegistryClient, RegistryDisplayMapper, RegistryError,
        RegistrySnapshot,
    };
    use crate::lifecycle::{LifecycleAnnotation, LifecycleStatus};
    use crate::projection::{SnapshotProfile, TableFilter};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, 12, 10, 0).unwrap()
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(now()))
    }

    fn pipeline() -> Pipeline {
        Pipeline::default().with_clock(clock())
    }

    fn hours_ago(h: i64) -> DateTime<Utc> {
        now() - chrono::Duration::hours(h)
    }

    #[tokio::test]
    async fn test_vertex_gemini_end_to_end() {
        let json = r#"[
            {"provider": "vertex", "model_name": "gemini-1.5-pro", "tokens_per_second": 40, "time_to_first_token": 0.9, "run_ts": "2024-05-08T09:00:00Z"},
            {"provider": "vertex", "model_name": "gemini-1.5-pro", "tokens_per_second": 50, "time_to_first_token": 1.1, "run_ts": "2024-05-08T10:00:00Z"},
            {"provider": "vertex", "model_name": "gemini-1.5-pro", "tokens_per_second": 60, "time_to_first_token": null, "run_ts": "2024-05-08T11:00:00Z"}
        ]"#;
        let samples: Vec<RawSample> = serde_json::from_str(json).unwrap();

        let run = pipeline().run(&samples).await.unwrap();
        let output = serde_json::to_value(&run.result).unwrap();

        let row = &output["table"][0];
        assert_eq!(row["providerCanonical"], "vertex");
        assert_eq!(row["providerSlug"], "vertex");
        assert_eq!(row["provider"], "google");
        assert_eq!(row["modelCanonical"], "gemini-1.5-pro");
        assert_eq!(row["tokens_per_second_mean"], 50.0);
        assert_eq!(row["time_to_first_token_mean"], 1.0);

        let entry = &output["speedDistribution"][0];
        assert_eq!(entry["provider"], "google");
        assert_eq!(entry["mean_tokens_per_second"], 50.0);

        let series = &output["timeSeries"]["models"][0]["providers"][0];
        assert_eq!(series["provider"], "google");
        assert_eq!(series["providerCanonical"], "vertex");
        assert_eq!(
            series["values"].as_array().map(|v| v.len()),
            output["timeSeries"]["timestamps"].as_array().map(|t| t.len())
        );
    }

    #[tokio::test]
    async fn test_gpt4_spellings_merge() {
        let samples = vec![
            RawSample::new("openai", "gpt-4-0613", 20.0, None, hours_ago(3)),
            RawSample::new("openai", "gpt-4-0613", 22.0, None, hours_ago(2)),
            RawSample::new("openai", "gpt-4-0314", 18.0, None, hours_ago(1)),
        ];

        let run = pipeline().run(&samples).await.unwrap();
        assert_eq!(run.ingest.groups, 2);
        assert_eq!(run.result.table.len(), 1);

        let row = &run.result.table[0];
        assert_eq!(row.display_name, "gpt-4");
        assert_eq!(row.model_canonical, "gpt-4-0314");
        assert_eq!(row.tokens_per_second_mean, 19.5);

        let provider = &run.result.time_series.models[0].providers[0];
        assert_eq!(provider.values.iter().flatten().count(), 3);
    }

    #[tokio::test]
    async fn test_canonical_fields_unchanged_end_to_end() {
        let samples = vec![
            RawSample::new("vertex", "gemini-1.5-pro", 40.0, None, hours_ago(1)),
            RawSample::new("openai", "gpt-4-0613", 20.0, None, hours_ago(1)),
            RawSample::new("Together AI", "meta-llama/Meta-Llama-3-70B-Instruct", 90.0, None, hours_ago(1)),
        ];
        let run = pipeline().run(&samples).await.unwrap();

        let mut seen: Vec<(String, String)> = run
            .result
            .table
            .iter()
            .map(|r| (r.provider_canonical.clone(), r.model_canonical.clone()))
            .collect();
        let mut expected: Vec<(String, String)> = samples
            .iter()
            .map(|s| (s.provider.clone(), s.model_name.clone()))
            .collect();
        seen.sort();
        expected.sort();
        assert_eq!(seen, expected);

        for row in &run.result.table {
            for slug in [&row.provider_slug, &row.model_slug] {
                assert!(slug
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            }
        }
    }

    #[tokio::test]
    async fn test_sample_hint_used_when_unresolved() {
        let mut sample = RawSample::new("acme", "rocket-1-20240501", 30.0, None, hours_ago(1));
        sample.display_name = Some("  Rocket 1 ".into());

        let run = pipeline().run(&[sample]).await.unwrap();
        assert_eq!(run.result.table[0].display_name, "Rocket 1");
        assert_eq!(run.result.table[0].model_canonical, "rocket-1-20240501");
    }

    #[tokio::test]
    async fn test_filter_applies_to_every_output() {
        let samples = vec![
            RawSample::new("openai", "model-a", 30.0, None, hours_ago(1)),
            RawSample::new("openai", "model-b", 20.0, None, hours_ago(1)),
        ];
        let mut lifecycle = LifecycleIndex::new();
        lifecycle.insert(
            CanonicalKey::new("openai", "model-b"),
            LifecycleAnnotation {
                status: LifecycleStatus::LikelyDeprecated,
                confidence: 0.7,
                reasons: vec!["no successful runs".into()],
                computed_at: now(),
            },
        );
        let options = PipelineOptions {
            filter: TableFilter::hide_flagged(),
            ..PipelineOptions::default()
        };

        let run = pipeline()
            .with_lifecycle(lifecycle)
            .with_options(options)
            .run(&samples)
            .await
            .unwrap();

        assert_eq!(run.result.table.len(), 1);
        assert_eq!(run.result.table[0].model_canonical, "model-a");
        assert_eq!(run.result.speed_distribution.len(), 1);
        assert_eq!(run.result.speed_distribution[0].model_name, "model-a");
        assert_eq!(run.result.time_series.models.len(), 1);
        assert_eq!(run.metrics.counts.visible_benchmarks, 1);
        assert_eq!(run.metrics.counts.lifecycle_attached, 1);
    }

    #[tokio::test]
    async fn test_invalid_days() {
        let options = PipelineOptions {
            days: 0,
            ..PipelineOptions::default()
        };
        let err = pipeline().with_options(options).run(&[]).await.unwrap_err();
        assert_eq!(err, PipelineError::InvalidDays(0));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let run = pipeline().run(&[]).await.unwrap();
        assert!(run.result.table.is_empty());
        assert!(run.result.speed_distribution.is_empty());
        assert!(run.result.time_series.models.is_empty());
        assert_eq!(run.result.time_series.timestamps.len(), run.grid.len());
    }

    #[tokio::test]
    async fn test_slug_collision_fails_batch() {
        let samples = vec![
            RawSample::new("openai", "gpt-4.0", 30.0, None, hours_ago(1)),
            RawSample::new("openai", "gpt-40", 30.0, None, hours_ago(1)),
        ];
        let err = pipeline().run(&samples).await.unwrap_err();
        assert!(matches!(err, PipelineError::SlugCollision { .. }));
    }

    struct DownRegistry;

    #[async_trait]
    impl RegistryClient for DownRegistry {
        async fn fetch_all(&self) -> Result<RegistrySnapshot, RegistryError> {
            Err(RegistryError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_registry_down_falls_back_to_static_table() {
        let cache = Arc::new(RegistryCache::with_clock(
            Arc::new(DownRegistry),
            RegistryCacheConfig::default(),
            clock(),
        ));
        let mapper = RegistryDisplayMapper::new(cache, StaticDisplayTable::builtin());
        let samples = vec![
            RawSample::new("openai", "gpt-4-0613", 20.0, None, hours_ago(2)),
            RawSample::new("openai", "gpt-4-0314", 18.0, None, hours_ago(1)),
        ];

        let run = Pipeline::new(Arc::new(mapper))
            .with_clock(clock())
            .run(&samples)
            .await
            .unwrap();
        assert_eq!(run.result.table.len(), 1);
        assert_eq!(run.result.table[0].display_name, "gpt-4");
    }

    #[tokio::test]
    async fn test_run_with_timeout_completes() {
        let samples = vec![RawSample::new("openai", "gpt-4", 20.0, None, hours_ago(1))];
        let run = pipeline()
            .run_with_timeout(&samples, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(run.metrics.counts.samples_accepted, 1);
    }

    /// Every key is the deprecated GPT-4 snapshot
    struct DeprecatingMapper;

    #[async_trait]
    impl DisplayMapper for DeprecatingMapper {
        async fn resolve(&self, _key: &CanonicalKey) -> Resolution {
            let mut entry = DisplayEntry::named("gpt-4");
            entry.deprecated = true;
            entry.deprecation_date = Some(hours_ago(24));
            Resolution {
                entry,
                source: ResolutionSource::Registry,
            }
        }
    }

    /// Holds the projection until another task on the runtime has run
    struct WaitingSnapshots {
        ticked: Arc<AtomicBool>,
        saw_tick: AtomicBool,
    }

    impl SnapshotSource for WaitingSnapshots {
        fn profile(&self, _key: &CanonicalKey) -> Option<SnapshotProfile> {
            let deadline = Instant::now() + Duration::from_secs(2);
            while Instant::now() < deadline {
                if self.ticked.load(Ordering::SeqCst) {
                    self.saw_tick.store(true, Ordering::SeqCst);
                    break;
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            None
        }
    }

    #[tokio::test]
    async fn test_projection_leaves_runtime_free() {
        let ticked = Arc::new(AtomicBool::new(false));
        let snapshots = Arc::new(WaitingSnapshots {
            ticked: Arc::clone(&ticked),
            saw_tick: AtomicBool::new(false),
        });
        let ticker = tokio::spawn(async move { ticked.store(true, Ordering::SeqCst) });

        let samples = vec![RawSample::new("openai", "gpt-4-0314", 20.0, None, hours_ago(30))];
        let run = Pipeline::new(Arc::new(DeprecatingMapper))
            .with_clock(clock())
            .with_snapshots(snapshots.clone())
            .run(&samples)
            .await
            .unwrap();
        ticker.await.unwrap();

        assert_eq!(run.result.table.len(), 1);
        assert!(snapshots.saw_tick.load(Ordering::SeqCst));
    }
}
