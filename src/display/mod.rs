//! Display identity resolution and merging
//!
//! Collapses many raw model spellings into one stable display identity
//! without ever touching the canonical identity.
//!
//! ## Resolution chain
//!
//! ```text
//! CanonicalKey
//!     │
//!     ▼
//! ┌──────────────────┐  hit
//! │ RegistryResolver │ ─────▶ DisplayEntry (Registry)
//! └────────┬─────────┘
//!          │ miss / registry down
//!          ▼
//! ┌──────────────────┐  hit
//! │ StaticDisplayTable│ ────▶ DisplayEntry (StaticTable)
//! └────────┬─────────┘
//!          │ miss
//!          ▼
//! ┌──────────────────┐
//! │ CanonicalIdResolver│ ───▶ DisplayEntry (Canonical)
//! └──────────────────┘
//! ```
//!
//! ## Provider aliases
//!
//! Some providers are shown under another label (`vertex` is shown as
//! `google`). Only [`MergedBenchmark::provider`] changes; the canonical
//! provider id and its slug are never replaced by the alias.

pub mod aliases;
pub mod merge;
pub mod registry;
pub mod resolver;
pub mod slug;
pub mod static_table;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::CanonicalKey;

pub use aliases::ProviderAliases;
pub use merge::{
    check_slug_collisions, merge_aggregates, resolve_last_runs, LastRunLookup, MergedBenchmark,
    MergedStats,
};
pub use registry::{
    JsonFileRegistry, RegistryCache, RegistryCacheConfig, RegistryClient, RegistryError,
    RegistryRecord, RegistrySnapshot,
};
pub use resolver::{CanonicalIdResolver, RegistryDisplayMapper, RegistryResolver, ResolverChain};
pub use slug::slugify;
pub use static_table::StaticDisplayTable;

/// Display metadata for one canonical identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEntry {
    pub display_name: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecation_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successor_model: Option<String>,
}

impl DisplayEntry {
    /// Entry carrying only a display name
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            deprecated: false,
            deprecation_date: None,
            successor_model: None,
        }
    }
}

/// Which link of the fallback chain produced an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Registry,
    StaticTable,
    SampleHint,
    Canonical,
}

/// Resolved display entry plus its provenance
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entry: DisplayEntry,
    pub source: ResolutionSource,
}

impl Resolution {
    /// Pass-through resolution: the canonical model id is the display name
    pub fn canonical(key: &CanonicalKey) -> Self {
        Self {
            entry: DisplayEntry::named(key.model()),
            source: ResolutionSource::Canonical,
        }
    }
}

/// Strategy that maps canonical identities to display identities
///
/// Implementations never fail: any collaborator error is recovered locally
/// and the canonical id is returned as a last resort.
#[async_trait]
pub trait DisplayMapper: Send + Sync {
    /// Resolve one canonical key
    async fn resolve(&self, key: &CanonicalKey) -> Resolution;

    /// Resolve a batch of keys
    async fn resolve_all(&self, keys: &[CanonicalKey]) -> HashMap<CanonicalKey, Resolution> {
        let mut resolved = HashMap::with_capacity(keys.len());
        for key in keys {
            let resolution = self.resolve(key).await;
            resolved.insert(key.clone(), resolution);
        }
        resolved
    }
}

/// One link of an ordered fallback chain
#[async_trait]
pub trait DisplayResolver: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Provenance reported for entries this resolver returns
    fn source(&self) -> ResolutionSource;

    /// `None` hands the key to the next resolver
    async fn lookup(&self, key: &CanonicalKey) -> Option<DisplayEntry>;
}
