//! Synthetic continuation for deprecated providers
//!
//! Once a provider is deprecated its real measurements stop. A snapshot
//! profile summarises its last known behaviour so the chart can keep a
//! clearly tagged synthetic line after the deprecation boundary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::CanonicalKey;

use super::rounding::round3;

/// Percentile summary of a provider's final measurement period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProfile {
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub sampling_period_days: u32,
    pub sample_size: usize,
}

impl SnapshotProfile {
    /// Copy with percentiles rounded for output
    pub fn rounded(&self) -> Self {
        Self {
            p10: round3(self.p10),
            p50: round3(self.p50),
            p90: round3(self.p90),
            ..*self
        }
    }
}

/// Wire form of one profile keyed by canonical identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub provider: String,
    pub model_name: String,
    #[serde(flatten)]
    pub profile: SnapshotProfile,
}

/// Collaborator that owns snapshot synthesis
pub trait SnapshotSource: Send + Sync {
    /// Profile for a deprecated provider, `None` disables the split
    fn profile(&self, key: &CanonicalKey) -> Option<SnapshotProfile>;

    /// Synthetic value for one slot after the boundary
    fn value_at(&self, profile: &SnapshotProfile, _slot: DateTime<Utc>) -> f64 {
        profile.p50
    }
}

/// Emits the profile median for every slot
#[derive(Debug, Clone, Default)]
pub struct MedianSnapshotSource {
    profiles: HashMap<CanonicalKey, SnapshotProfile>,
}

impl MedianSnapshotSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = SnapshotRecord>) -> Self {
        let mut source = Self::new();
        for record in records {
            source.insert(
                CanonicalKey::new(record.provider, record.model_name),
                record.profile,
            );
        }
        source
    }

    pub fn insert(&mut self, key: CanonicalKey, profile: SnapshotProfile) {
        self.profiles.insert(key, profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl SnapshotSource for MedianSnapshotSource {
    fn profile(&self, key: &CanonicalKey) -> Option<SnapshotProfile> {
        self.profiles.get(key).copied()
    }
}
