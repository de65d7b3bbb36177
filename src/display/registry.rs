//! Registry-backed display metadata with a TTL cache
//!
//! The registry is an external metadata store keyed by canonical identity.
//! [`RegistryCache`] keeps one snapshot of it in memory:
//!
//! - **Fresh hit**: returned without touching the registry
//! - **Expired or empty**: one refresh is started; concurrent callers join
//!   the same in-flight future instead of starting their own
//! - **Refresh failure or timeout**: the stale snapshot (or nothing) is
//!   returned and further refreshes are suppressed for `failure_backoff`
//!
//! Failures never reach the caller; the resolver chain falls back to the
//! static table and finally to the canonical id.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::Instrument;

use super::DisplayEntry;
use crate::clock::{Clock, SystemClock};
use crate::ingest::CanonicalKey;
use crate::instrumentation::registry_refresh_span;

/// Full registry contents keyed by canonical identity
pub type RegistrySnapshot = HashMap<CanonicalKey, DisplayEntry>;

type RefreshOutcome = Result<Arc<RegistrySnapshot>, RegistryError>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Registry access errors (always recovered locally)
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry payload invalid: {0}")]
    InvalidPayload(String),

    #[error("Registry refresh timed out after {0:?}")]
    Timeout(Duration),
}

/// Client for the external metadata store
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch every registered (provider, model) entry
    async fn fetch_all(&self) -> Result<RegistrySnapshot, RegistryError>;
}

/// Cache timing configuration
#[derive(Debug, Clone)]
pub struct RegistryCacheConfig {
    /// How long a fetched snapshot is served without refreshing
    pub ttl: Duration,
    /// Longest a caller waits on a refresh before falling back
    pub refresh_timeout: Duration,
    /// Quiet period after a failed refresh
    pub failure_backoff: Duration,
}

impl Default for RegistryCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            refresh_timeout: Duration::from_secs(2),
            failure_backoff: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct CacheState {
    snapshot: Option<Arc<RegistrySnapshot>>,
    fetched_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    in_flight: Option<(u64, RefreshFuture)>,
    generation: u64,
}

fn elapsed_since(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    // A clock that moved backwards counts as no time elapsed
    (now - since).to_std().unwrap_or_default()
}

/// In-memory TTL cache over a [`RegistryClient`]
pub struct RegistryCache {
    client: Arc<dyn RegistryClient>,
    clock: Arc<dyn Clock>,
    config: RegistryCacheConfig,
    state: Mutex<CacheState>,
}

impl RegistryCache {
    /// Create a cache reading the system clock
    pub fn new(client: Arc<dyn RegistryClient>, config: RegistryCacheConfig) -> Self {
        Self::with_clock(client, config, Arc::new(SystemClock))
    }

    /// Create a cache with an injected clock
    pub fn with_clock(
        client: Arc<dyn RegistryClient>,
        config: RegistryCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            client,
            clock,
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &RegistryCacheConfig {
        &self.config
    }

    /// Current snapshot, refreshing it first if it has expired
    ///
    /// Returns `None` only when no snapshot was ever fetched and the
    /// refresh failed.
    pub async fn get(&self) -> Option<Arc<RegistrySnapshot>> {
        let now = self.clock.now();
        let (stale, pending) = {
            let mut state = self.state.lock();
            if let (Some(snapshot), Some(fetched_at)) = (&state.snapshot, state.fetched_at) {
                if elapsed_since(fetched_at, now) < self.config.ttl {
                    return Some(Arc::clone(snapshot));
                }
            }
            if let Some(failed_at) = state.failed_at {
                if elapsed_since(failed_at, now) < self.config.failure_backoff {
                    return state.snapshot.clone();
                }
            }
            (state.snapshot.clone(), self.join_or_start(&mut state))
        };

        match self.await_refresh(pending).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(
                    "Registry refresh failed, serving {} display names: {}",
                    if stale.is_some() { "stale" } else { "fallback" },
                    e
                );
                stale
            }
        }
    }

    /// Force a refresh (joins one already in flight)
    pub async fn refresh(&self) -> Result<Arc<RegistrySnapshot>, RegistryError> {
        let pending = {
            let mut state = self.state.lock();
            self.join_or_start(&mut state)
        };
        self.await_refresh(pending).await
    }

    /// Drop the cached snapshot so the next `get` refreshes
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.snapshot = None;
        state.fetched_at = None;
        state.failed_at = None;
    }

    /// Whether a refresh is currently outstanding
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    fn join_or_start(&self, state: &mut CacheState) -> (u64, RefreshFuture) {
        if let Some((generation, pending)) = &state.in_flight {
            return (*generation, pending.clone());
        }

        state.generation += 1;
        let generation = state.generation;
        let client = Arc::clone(&self.client);
        let pending = async move { client.fetch_all().await.map(Arc::new) }
            .instrument(registry_refresh_span(generation))
            .boxed()
            .shared();
        state.in_flight = Some((generation, pending.clone()));
        (generation, pending)
    }

    async fn await_refresh(&self, (generation, pending): (u64, RefreshFuture)) -> RefreshOutcome {
        let outcome = match tokio::time::timeout(self.config.refresh_timeout, pending).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // The refresh stays in flight; later callers join it after the backoff
                self.state.lock().failed_at = Some(self.clock.now());
                return Err(RegistryError::Timeout(self.config.refresh_timeout));
            }
        };

        let now = self.clock.now();
        let mut state = self.state.lock();
        let current = matches!(&state.in_flight, Some((g, _)) if *g == generation);
        if current {
            state.in_flight = None;
            match &outcome {
                Ok(snapshot) => {
                    tracing::debug!("Registry refreshed: {} entries", snapshot.len());
                    state.snapshot = Some(Arc::clone(snapshot));
                    state.fetched_at = Some(now);
                    state.failed_at = None;
                }
                Err(_) => state.failed_at = Some(now),
            }
        }
        outcome
    }
}

/// Wire form of one registry entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub provider: String,
    pub model_name: String,
    #[serde(flatten)]
    pub entry: DisplayEntry,
}

impl RegistryRecord {
    pub fn into_pair(self) -> (CanonicalKey, DisplayEntry) {
        (CanonicalKey::new(self.provider, self.model_name), self.entry)
    }
}

/// Registry read from a JSON array of [`RegistryRecord`]s
#[derive(Debug, Clone)]
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RegistryClient for JsonFileRegistry {
    async fn fetch_all(&self) -> Result<RegistrySnapshot, RegistryError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RegistryError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let records: Vec<RegistryRecord> = serde_json::from_str(&content)
            .map_err(|e| RegistryError::InvalidPayload(e.to_string()))?;
        Ok(records.into_iter().map(RegistryRecord::into_pair).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingRegistry {
        fetches: AtomicUsize,
        fail: AtomicBool,
        delay: Duration,
    }

    impl CountingRegistry {
        fn new(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                delay,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RegistryClient for CountingRegistry {
        async fn fetch_all(&self) -> Result<RegistrySnapshot, RegistryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(RegistryError::Unavailable("connection refused".into()));
            }
            let mut snapshot = HashMap::new();
            snapshot.insert(
                CanonicalKey::new("openai", "gpt-4-0613"),
                DisplayEntry::named("GPT-4"),
            );
            Ok(snapshot)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn cache_with(
        registry: Arc<CountingRegistry>,
        clock: Arc<ManualClock>,
        config: RegistryCacheConfig,
    ) -> RegistryCache {
        RegistryCache::with_clock(registry, config, clock)
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_refresh() {
        let registry = CountingRegistry::new(Duration::from_millis(20));
        let clock = Arc::new(ManualClock::new(start()));
        let cache = Arc::new(cache_with(
            Arc::clone(&registry),
            clock,
            RegistryCacheConfig::default(),
        ));

        let calls = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.get().await }
        });
        let results = futures::future::join_all(calls).await;

        assert!(results.iter().all(|r| r.is_some()));
        assert_eq!(registry.fetches(), 1);
        assert!(!cache.is_refreshing());
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_registry() {
        let registry = CountingRegistry::new(Duration::ZERO);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = cache_with(Arc::clone(&registry), Arc::clone(&clock), RegistryCacheConfig::default());

        cache.get().await.unwrap();
        clock.advance(chrono::Duration::minutes(4));
        cache.get().await.unwrap();
        assert_eq!(registry.fetches(), 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_refreshes() {
        let registry = CountingRegistry::new(Duration::ZERO);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = cache_with(Arc::clone(&registry), Arc::clone(&clock), RegistryCacheConfig::default());

        cache.get().await.unwrap();
        clock.advance(chrono::Duration::minutes(6));
        cache.get().await.unwrap();
        assert_eq!(registry.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failure_serves_stale_snapshot() {
        let registry = CountingRegistry::new(Duration::ZERO);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = cache_with(Arc::clone(&registry), Arc::clone(&clock), RegistryCacheConfig::default());

        let first = cache.get().await.unwrap();
        registry.fail.store(true, Ordering::SeqCst);
        clock.advance(chrono::Duration::minutes(10));

        let stale = cache.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(registry.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failure_without_snapshot_backs_off() {
        let registry = CountingRegistry::new(Duration::ZERO);
        registry.fail.store(true, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = cache_with(Arc::clone(&registry), Arc::clone(&clock), RegistryCacheConfig::default());

        assert!(cache.get().await.is_none());
        assert!(cache.get().await.is_none());
        assert_eq!(registry.fetches(), 1);

        clock.advance(chrono::Duration::seconds(31));
        registry.fail.store(false, Ordering::SeqCst);
        assert!(cache.get().await.is_some());
        assert_eq!(registry.fetches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_registry_times_out() {
        let registry = CountingRegistry::new(Duration::from_secs(60));
        let clock = Arc::new(ManualClock::new(start()));
        let config = RegistryCacheConfig {
            refresh_timeout: Duration::from_millis(50),
            ..RegistryCacheConfig::default()
        };
        let cache = cache_with(Arc::clone(&registry), clock, config);

        assert!(cache.get().await.is_none());
        assert!(matches!(
            cache.refresh().await,
            Err(RegistryError::Timeout(_))
        ));
        // The second call joined the first refresh
        assert_eq!(registry.fetches(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refresh() {
        let registry = CountingRegistry::new(Duration::ZERO);
        let clock = Arc::new(ManualClock::new(start()));
        let cache = cache_with(Arc::clone(&registry), clock, RegistryCacheConfig::default());

        cache.get().await.unwrap();
        cache.invalidate();
        cache.get().await.unwrap();
        assert_eq!(registry.fetches(), 2);
    }

    #[tokio::test]
    async fn test_json_file_registry() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(
            &path,
            r#"[{
                "provider": "openai",
                "model_name": "gpt-4-0314",
                "display_name": "gpt-4",
                "deprecated": true,
                "deprecation_date": "2024-06-13T00:00:00Z",
                "successor_model": "gpt-4o"
            }]"#,
        )
        .unwrap();

        let snapshot = JsonFileRegistry::new(&path).fetch_all().await.unwrap();
        let entry = &snapshot[&CanonicalKey::new("openai", "gpt-4-0314")];
        assert_eq!(entry.display_name, "gpt-4");
        assert!(entry.deprecated);
        assert_eq!(entry.successor_model.as_deref(), Some("gpt-4o"));
    }

    #[tokio::test]
    async fn test_json_file_registry_missing_file() {
        let result = JsonFileRegistry::new("/nonexistent/registry.json")
            .fetch_all()
            .await;
        assert!(matches!(result, Err(RegistryError::Unavailable(_))));
    }
}
