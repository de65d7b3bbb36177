//! Merging canonical aggregates that share a display identity
//!
//! Groups are keyed by `(providerCanonical, displayName)`. Two canonical
//! models on the same provider that resolve to one display name become one
//! row; the same display name on different providers stays separate.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::aliases::ProviderAliases;
use super::registry::RegistryError;
use super::slug::slugify;
use super::DisplayEntry;
use crate::ingest::{mean, CanonicalAggregate, CanonicalKey};
use crate::lifecycle::LifecycleAnnotation;
use crate::pipeline::PipelineError;

/// Summary statistics of a merged row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedStats {
    /// Mean of the per-source means
    pub tokens_per_second_mean: f64,
    pub tokens_per_second_min: f64,
    pub tokens_per_second_max: f64,
    /// Mean of the per-source latency means, if any source had latency data
    pub time_to_first_token_mean: Option<f64>,
    pub sample_count: usize,
}

/// One display identity on one canonical provider
#[derive(Debug, Clone)]
pub struct MergedBenchmark {
    /// User-facing provider label (may be an alias)
    pub provider: String,
    pub display_name: String,
    pub stats: MergedStats,
    pub deprecated: bool,
    pub deprecation_date: Option<DateTime<Utc>>,
    pub successor_model: Option<String>,
    pub last_benchmark_at: Option<DateTime<Utc>>,
    canonical: CanonicalKey,
    provider_slug: String,
    model_slug: String,
    sources: Vec<CanonicalKey>,
    run_ts: Vec<DateTime<Utc>>,
    tokens_per_second: Vec<f64>,
    time_to_first_token: Vec<f64>,
    lifecycle: Option<LifecycleAnnotation>,
}

impl MergedBenchmark {
    /// Canonical identity of the primary source
    pub fn primary_key(&self) -> &CanonicalKey {
        &self.canonical
    }

    pub fn provider_canonical(&self) -> &str {
        self.canonical.provider()
    }

    pub fn model_canonical(&self) -> &str {
        self.canonical.model()
    }

    pub fn provider_slug(&self) -> &str {
        &self.provider_slug
    }

    pub fn model_slug(&self) -> &str {
        &self.model_slug
    }

    /// Every canonical key folded into this row, primary first
    pub fn sources(&self) -> &[CanonicalKey] {
        &self.sources
    }

    /// Pooled throughput samples ordered by `run_ts`
    pub fn tokens_per_second(&self) -> &[f64] {
        &self.tokens_per_second
    }

    /// Timestamps parallel to [`Self::tokens_per_second`]
    pub fn run_ts(&self) -> &[DateTime<Utc>] {
        &self.run_ts
    }

    pub fn time_to_first_token(&self) -> &[f64] {
        &self.time_to_first_token
    }

    /// `(run_ts, tokens_per_second)` pairs in time order
    pub fn samples(&self) -> impl Iterator<Item = (DateTime<Utc>, f64)> + '_ {
        self.run_ts
            .iter()
            .copied()
            .zip(self.tokens_per_second.iter().copied())
    }

    /// Exact mean over all pooled throughput samples
    pub fn pooled_tokens_per_second_mean(&self) -> Option<f64> {
        mean(&self.tokens_per_second)
    }

    pub fn latest_run(&self) -> Option<DateTime<Utc>> {
        self.run_ts.last().copied()
    }

    pub fn lifecycle(&self) -> Option<&LifecycleAnnotation> {
        self.lifecycle.as_ref()
    }

    pub fn set_lifecycle(&mut self, annotation: LifecycleAnnotation) {
        self.lifecycle = Some(annotation);
    }
}

/// Regroup aggregates by `(providerCanonical, displayName)`
///
/// `entries` holds the resolved display entry for each canonical key; keys
/// missing from it display under their canonical model id. Output is sorted
/// by canonical provider, then display name.
pub fn merge_aggregates(
    aggregates: &[CanonicalAggregate],
    entries: &HashMap<CanonicalKey, DisplayEntry>,
    aliases: &ProviderAliases,
) -> Vec<MergedBenchmark> {
    let mut groups: BTreeMap<(String, String), Vec<(&CanonicalAggregate, DisplayEntry)>> =
        BTreeMap::new();

    for aggregate in aggregates {
        let entry = entries
            .get(aggregate.key())
            .cloned()
            .unwrap_or_else(|| DisplayEntry::named(aggregate.model_canonical()));
        groups
            .entry((
                aggregate.provider_canonical().to_string(),
                entry.display_name.clone(),
            ))
            .or_default()
            .push((aggregate, entry));
    }

    let merged: Vec<MergedBenchmark> = groups
        .into_iter()
        .filter_map(|((provider, display_name), members)| {
            merge_group(&provider, display_name, &members, aliases)
        })
        .collect();

    tracing::debug!(
        "Merged {} canonical groups into {} display rows",
        aggregates.len(),
        merged.len()
    );
    merged
}

fn merge_group(
    provider: &str,
    display_name: String,
    members: &[(&CanonicalAggregate, DisplayEntry)],
    aliases: &ProviderAliases,
) -> Option<MergedBenchmark> {
    let (primary, _) = members.first()?;
    let canonical = primary.key().clone();

    let mut samples: Vec<(DateTime<Utc>, f64)> = members
        .iter()
        .flat_map(|(agg, _)| {
            agg.run_ts()
                .iter()
                .copied()
                .zip(agg.tokens_per_second().iter().copied())
        })
        .collect();
    samples.sort_by(|a, b| a.0.cmp(&b.0));
    let (run_ts, tokens_per_second): (Vec<_>, Vec<_>) = samples.into_iter().unzip();

    let time_to_first_token: Vec<f64> = members
        .iter()
        .flat_map(|(agg, _)| agg.time_to_first_token().iter().copied())
        .collect();

    let group_means: Vec<f64> = members
        .iter()
        .map(|(agg, _)| agg.tokens_per_second_stats().mean)
        .collect();
    let latency_means: Vec<f64> = members
        .iter()
        .filter_map(|(agg, _)| agg.time_to_first_token_stats().map(|s| s.mean))
        .collect();

    let stats = MergedStats {
        tokens_per_second_mean: mean(&group_means)?,
        tokens_per_second_min: members
            .iter()
            .map(|(agg, _)| agg.tokens_per_second_stats().min)
            .fold(f64::INFINITY, f64::min),
        tokens_per_second_max: members
            .iter()
            .map(|(agg, _)| agg.tokens_per_second_stats().max)
            .fold(f64::NEG_INFINITY, f64::max),
        time_to_first_token_mean: mean(&latency_means),
        sample_count: tokens_per_second.len(),
    };

    // A row is deprecated only once every spelling behind it is; a live
    // row carries no deprecation date
    let deprecated = members.iter().all(|(_, entry)| entry.deprecated);
    let deprecation_date = members
        .iter()
        .filter_map(|(_, entry)| entry.deprecation_date)
        .max()
        .filter(|_| deprecated);
    let successor_model = members
        .iter()
        .find_map(|(_, entry)| entry.successor_model.clone());

    Some(MergedBenchmark {
        provider: aliases.label_for(provider).to_string(),
        display_name,
        stats,
        deprecated,
        deprecation_date,
        successor_model,
        last_benchmark_at: run_ts.last().copied(),
        provider_slug: slugify(canonical.provider()),
        model_slug: slugify(canonical.model()),
        sources: members.iter().map(|(agg, _)| agg.key().clone()).collect(),
        canonical,
        run_ts,
        tokens_per_second,
        time_to_first_token,
        lifecycle: None,
    })
}

/// Fail when two distinct canonical ids share a non-empty slug
///
/// Providers and models are checked separately; the same model id served by
/// several providers is not a collision.
pub fn check_slug_collisions(benchmarks: &[MergedBenchmark]) -> Result<(), PipelineError> {
    let mut providers: HashMap<&str, &str> = HashMap::new();
    let mut models: HashMap<&str, &str> = HashMap::new();

    for benchmark in benchmarks {
        claim_slug(
            &mut providers,
            benchmark.provider_slug(),
            benchmark.provider_canonical(),
        )?;
        claim_slug(
            &mut models,
            benchmark.model_slug(),
            benchmark.model_canonical(),
        )?;
    }
    Ok(())
}

fn claim_slug<'a>(
    owners: &mut HashMap<&'a str, &'a str>,
    slug: &'a str,
    canonical: &'a str,
) -> Result<(), PipelineError> {
    if slug.is_empty() {
        return Ok(());
    }
    match owners.get(slug) {
        Some(owner) if *owner != canonical => Err(PipelineError::SlugCollision {
            slug: slug.to_string(),
            first: owner.to_string(),
            second: canonical.to_string(),
        }),
        Some(_) => Ok(()),
        None => {
            owners.insert(slug, canonical);
            Ok(())
        }
    }
}

/// Collaborator answering "when did this model last run successfully"
#[async_trait]
pub trait LastRunLookup: Send + Sync {
    async fn last_run(&self, key: &CanonicalKey) -> Result<Option<DateTime<Utc>>, RegistryError>;
}

/// Fill `last_benchmark_at` from the collaborator
///
/// Lookup failures are logged and the latest sample time is kept.
pub async fn resolve_last_runs(
    benchmarks: &mut [MergedBenchmark],
    lookup: Option<&dyn LastRunLookup>,
) {
    let Some(lookup) = lookup else {
        return;
    };

    for benchmark in benchmarks.iter_mut() {
        match lookup.last_run(benchmark.primary_key()).await {
            Ok(Some(ts)) => benchmark.last_benchmark_at = Some(ts),
            Ok(None) => benchmark.last_benchmark_at = benchmark.latest_run(),
            Err(e) => {
                tracing::warn!(
                    "Last-run lookup failed for {}, using latest sample: {}",
                    benchmark.primary_key(),
                    e
                );
                benchmark.last_benchmark_at = benchmark.latest_run();
            }
        }
    }
}
