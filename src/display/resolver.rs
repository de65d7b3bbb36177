//! Ordered display-name resolver chain
//!
//! Each resolver either answers or hands the key to the next one. The last
//! link always answers with the canonical model id.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::registry::RegistryCache;
use super::static_table::StaticDisplayTable;
use super::{DisplayEntry, DisplayMapper, DisplayResolver, Resolution, ResolutionSource};
use crate::ingest::CanonicalKey;

/// Terminal resolver: the canonical model id is the display name
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalIdResolver;

#[async_trait]
impl DisplayResolver for CanonicalIdResolver {
    fn name(&self) -> &'static str {
        "canonical"
    }

    fn source(&self) -> ResolutionSource {
        ResolutionSource::Canonical
    }

    async fn lookup(&self, key: &CanonicalKey) -> Option<DisplayEntry> {
        Some(DisplayEntry::named(key.model()))
    }
}

/// Resolver backed by the cached registry snapshot
pub struct RegistryResolver {
    cache: Arc<RegistryCache>,
}

impl RegistryResolver {
    pub fn new(cache: Arc<RegistryCache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl DisplayResolver for RegistryResolver {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn source(&self) -> ResolutionSource {
        ResolutionSource::Registry
    }

    async fn lookup(&self, key: &CanonicalKey) -> Option<DisplayEntry> {
        let snapshot = self.cache.get().await?;
        snapshot.get(key).cloned()
    }
}

/// First resolver returning `Some` wins
#[derive(Clone, Default)]
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn DisplayResolver>>,
}

impl ResolverChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resolver at the lowest priority so far
    pub fn then(mut self, resolver: Arc<dyn DisplayResolver>) -> Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }
}

#[async_trait]
impl DisplayMapper for ResolverChain {
    async fn resolve(&self, key: &CanonicalKey) -> Resolution {
        for resolver in &self.resolvers {
            if let Some(entry) = resolver.lookup(key).await {
                tracing::trace!("{} resolved by {}", key, resolver.name());
                return Resolution {
                    entry,
                    source: resolver.source(),
                };
            }
        }
        Resolution::canonical(key)
    }
}

/// Registry lookup with the static table as fallback
pub struct RegistryDisplayMapper {
    cache: Arc<RegistryCache>,
    chain: ResolverChain,
}

impl RegistryDisplayMapper {
    pub fn new(cache: Arc<RegistryCache>, fallback: StaticDisplayTable) -> Self {
        let chain = ResolverChain::new()
            .then(Arc::new(RegistryResolver::new(Arc::clone(&cache))))
            .then(Arc::new(fallback))
            .then(Arc::new(CanonicalIdResolver));
        Self { cache, chain }
    }

    pub fn cache(&self) -> &Arc<RegistryCache> {
        &self.cache
    }
}

#[async_trait]
impl DisplayMapper for RegistryDisplayMapper {
    async fn resolve(&self, key: &CanonicalKey) -> Resolution {
        self.chain.resolve(key).await
    }

    async fn resolve_all(&self, keys: &[CanonicalKey]) -> HashMap<CanonicalKey, Resolution> {
        // Warm the cache once so a slow registry costs one timeout per batch
        let _ = self.cache.get().await;
        let mut resolved = HashMap::with_capacity(keys.len());
        for key in keys {
            resolved.insert(key.clone(), self.chain.resolve(key).await);
        }
        resolved
    }
}
