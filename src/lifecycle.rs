//! Lifecycle annotations
//!
//! Lifecycle status is computed by an external collaborator. This module only
//! models its output contract and attaches it to merged benchmarks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::display::MergedBenchmark;
use crate::ingest::CanonicalKey;

/// Whether a model is still meaningfully tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    Active,
    Stale,
    LikelyDeprecated,
    Deprecated,
    Failing,
    NeverSucceeded,
    Disabled,
}

/// Statuses hidden when flagged rows are suppressed
pub const FLAGGED_STATUSES: [LifecycleStatus; 6] = [
    LifecycleStatus::LikelyDeprecated,
    LifecycleStatus::Deprecated,
    LifecycleStatus::Failing,
    LifecycleStatus::Stale,
    LifecycleStatus::NeverSucceeded,
    LifecycleStatus::Disabled,
];

impl LifecycleStatus {
    pub fn is_flagged(self) -> bool {
        FLAGGED_STATUSES.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::Stale => "stale",
            LifecycleStatus::LikelyDeprecated => "likely_deprecated",
            LifecycleStatus::Deprecated => "deprecated",
            LifecycleStatus::Failing => "failing",
            LifecycleStatus::NeverSucceeded => "never_succeeded",
            LifecycleStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LifecycleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "active" => Ok(LifecycleStatus::Active),
            "stale" => Ok(LifecycleStatus::Stale),
            "likely_deprecated" => Ok(LifecycleStatus::LikelyDeprecated),
            "deprecated" => Ok(LifecycleStatus::Deprecated),
            "failing" => Ok(LifecycleStatus::Failing),
            "never_succeeded" => Ok(LifecycleStatus::NeverSucceeded),
            "disabled" => Ok(LifecycleStatus::Disabled),
            _ => Err(format!("Unknown lifecycle status: {}", s)),
        }
    }
}

/// Classification produced by the lifecycle collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleAnnotation {
    pub status: LifecycleStatus,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

/// Wire form of one annotation keyed by canonical identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleRecord {
    pub provider: String,
    pub model_name: String,
    #[serde(flatten)]
    pub annotation: LifecycleAnnotation,
}

/// Annotations indexed by canonical key
#[derive(Debug, Clone, Default)]
pub struct LifecycleIndex {
    by_key: HashMap<CanonicalKey, LifecycleAnnotation>,
}

impl LifecycleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = LifecycleRecord>) -> Self {
        let mut index = Self::new();
        for record in records {
            index.insert(
                CanonicalKey::new(record.provider, record.model_name),
                record.annotation,
            );
        }
        index
    }

    pub fn insert(&mut self, key: CanonicalKey, annotation: LifecycleAnnotation) {
        self.by_key.insert(key, annotation);
    }

    pub fn get(&self, key: &CanonicalKey) -> Option<&LifecycleAnnotation> {
        self.by_key.get(key)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Attach annotations to merged rows
    ///
    /// The primary canonical key wins; otherwise the first source key that
    /// has an annotation is used.
    pub fn attach(&self, benchmarks: &mut [MergedBenchmark]) -> usize {
        let mut attached = 0;
        for benchmark in benchmarks.iter_mut() {
            let annotation = benchmark
                .sources()
                .iter()
                .find_map(|key| self.get(key))
                .cloned();
            if let Some(annotation) = annotation {
                benchmark.set_lifecycle(annotation);
                attached += 1;
            }
        }
        attached
    }
}
