//! Configuration resolver.
//!
//! # Responsibilities
//! - Load the transformation document from the store under one canonical key
//! - Validate it and fall back to the built-in default on any failure
//! - Cache the resolved document for a TTL, expiring lazily
//! - Substitute `ref:` expression sources with their stored text
//!
//! # Data Flow
//! ```text
//! load_config()
//!     → cached and fresh?  → return it
//!     → lock refresh mutex (one store read per expiry)
//!     → store.get(config_key) → parse + validate
//!         ok        → cache as Store
//!         any error → log, cache default as Default
//! ```
//!
//! # Design Decisions
//! - Reads are lock-free through `ArcSwapOption`; only refreshes serialise
//! - Callers receive `Arc<TransformationConfig>` snapshots, never the slot
//! - `ref:` lookups are not cached; the compiled form is cached by the engine

use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::Mutex;

use super::defaults::default_config;
use super::types::{
    ConfigValidationError, Direction, TransformationConfig, TransformationExpression, VersionTransformation,
};
use crate::observability::metrics;
use crate::store::{ConfigStore, StoreError};

pub const DEFAULT_CONFIG_KEY: &str = "transformation-config";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Where the active document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Store,
    Default,
}

impl ConfigSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfigSource::Store => "store",
            ConfigSource::Default => "default",
        }
    }
}

#[derive(Debug, Error)]
enum LoadFailure {
    #[error("store read failed: {0}")]
    Store(#[from] StoreError),

    #[error("no document under key '{0}'")]
    Missing(String),

    #[error("{0}")]
    Invalid(#[from] ConfigValidationError),
}

struct ResolvedConfig {
    config: Arc<TransformationConfig>,
    source: ConfigSource,
    cached_at: Instant,
    loaded_at: SystemTime,
}

/// Snapshot of the resolver's cache slot, for the admin API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverStatus {
    pub config_key: String,
    pub cached: bool,
    pub source: Option<ConfigSource>,
    pub loaded_at_unix_secs: Option<u64>,
    pub age_secs: Option<u64>,
    pub ttl_secs: u64,
}

pub struct ConfigResolver {
    store: Arc<dyn ConfigStore>,
    config_key: String,
    ttl: Duration,
    cached: ArcSwapOption<ResolvedConfig>,
    refresh: Mutex<()>,
}

impl ConfigResolver {
    pub fn new(store: Arc<dyn ConfigStore>, config_key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            config_key: config_key.into(),
            ttl,
            cached: ArcSwapOption::empty(),
            refresh: Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<Arc<ResolvedConfig>> {
        self.cached
            .load_full()
            .filter(|resolved| resolved.cached_at.elapsed() < self.ttl)
    }

    /// Return the active document, reading the store if the cache is empty or stale.
    ///
    /// Never fails: store and validation errors resolve to the built-in default.
    pub async fn load_config(&self) -> Arc<TransformationConfig> {
        if let Some(resolved) = self.fresh() {
            metrics::record_config_load("cache");
            return Arc::clone(&resolved.config);
        }

        let _refresh = self.refresh.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(resolved) = self.fresh() {
            metrics::record_config_load("cache");
            return Arc::clone(&resolved.config);
        }

        let (config, source) = match self.fetch().await {
            Ok(config) => {
                tracing::info!(
                    key = %self.config_key,
                    versions = ?config.versions(),
                    "Loaded transformation config from store"
                );
                (config, ConfigSource::Store)
            }
            Err(e) => {
                tracing::warn!(key = %self.config_key, error = %e, "Falling back to default transformation config");
                (default_config(), ConfigSource::Default)
            }
        };

        let config = Arc::new(config);
        self.cached.store(Some(Arc::new(ResolvedConfig {
            config: Arc::clone(&config),
            source,
            cached_at: Instant::now(),
            loaded_at: SystemTime::now(),
        })));
        metrics::record_config_load(source.as_str());
        config
    }

    async fn fetch(&self) -> Result<TransformationConfig, LoadFailure> {
        let text = self
            .store
            .get(&self.config_key)
            .await?
            .ok_or_else(|| LoadFailure::Missing(self.config_key.clone()))?;
        Ok(TransformationConfig::from_json(&text)?)
    }

    /// Look up `version`, with any `ref:` sources replaced by their stored text.
    pub async fn get_version_transformation(&self, version: &str) -> Option<VersionTransformation> {
        let config = self.load_config().await;
        self.resolve_transformation(&config, version).await
    }

    /// Same as `get_version_transformation`, against a snapshot the caller already holds.
    pub async fn resolve_transformation(
        &self,
        config: &TransformationConfig,
        version: &str,
    ) -> Option<VersionTransformation> {
        let mut transformation = config.transformation(version)?.clone();
        for direction in [Direction::Request, Direction::Response] {
            self.resolve_reference(version, direction, transformation.leg_mut(direction))
                .await;
        }
        Some(transformation)
    }

    async fn resolve_reference(&self, version: &str, direction: Direction, expression: &mut TransformationExpression) {
        let Some(key) = expression.reference_key().map(str::to_owned) else {
            return;
        };
        match self.store.get(&key).await {
            Ok(Some(source)) => {
                tracing::debug!(version, %direction, key = %key, "Resolved expression reference");
                expression.source = source;
            }
            Ok(None) => {
                tracing::warn!(version, %direction, key = %key, "Referenced expression not found");
            }
            Err(e) => {
                tracing::warn!(version, %direction, key = %key, error = %e, "Failed to fetch referenced expression");
            }
        }
    }

    pub async fn is_supported_version(&self, version: &str) -> bool {
        self.load_config().await.is_supported(version)
    }

    pub async fn get_supported_versions(&self, route: &str) -> Vec<String> {
        self.load_config().await.supported_versions_for(route)
    }

    pub fn clear_cache(&self) {
        self.cached.store(None);
        tracing::info!(key = %self.config_key, "Transformation config cache cleared");
    }

    pub async fn reload(&self) -> Arc<TransformationConfig> {
        self.clear_cache();
        self.load_config().await
    }

    /// Source of the cached document, if any (stale or not).
    pub fn source(&self) -> Option<ConfigSource> {
        self.cached.load_full().map(|resolved| resolved.source)
    }

    pub fn status(&self) -> ResolverStatus {
        let snapshot = self.cached.load_full();
        let resolved = snapshot.as_deref();
        ResolverStatus {
            config_key: self.config_key.clone(),
            cached: resolved.is_some(),
            source: resolved.map(|r| r.source),
            loaded_at_unix_secs: resolved.and_then(|r| r.loaded_at.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())),
            age_secs: resolved.map(|r| r.cached_at.elapsed().as_secs()),
            ttl_secs: self.ttl.as_secs(),
        }
    }

    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DOCUMENT: &str = r#"{
        "schemaVersion": "1.0",
        "defaultVersion": "v1",
        "upstreamVersion": "v3",
        "transformations": {
            "v1": {
                "request": { "source": "ref:exprs/v1-request" },
                "response": { "source": "ref:exprs/missing" }
            },
            "v3": { "request": { "source": "$" }, "response": { "source": "$" } }
        },
        "routing": { "/legacy": ["v1"] }
    }"#;

    struct FailingStore;

    #[async_trait]
    impl ConfigStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn put(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    /// Wraps a memory store and counts reads.
    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ConfigStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
            self.inner.put(key, value).await
        }
    }

    fn seeded() -> MemoryStore {
        MemoryStore::with_entries([
            (DEFAULT_CONFIG_KEY, DOCUMENT),
            ("exprs/v1-request", "{\"id\": user_id}"),
        ])
    }

    #[tokio::test]
    async fn test_failing_store_falls_back_to_default() {
        let resolver = ConfigResolver::new(Arc::new(FailingStore), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        let config = resolver.load_config().await;
        assert_eq!(config.default_version, "v1");
        assert!(resolver.is_supported_version("v1").await);
        assert!(resolver.is_supported_version("v2").await);
        assert!(!resolver.is_supported_version("v9").await);
        assert_eq!(resolver.source(), Some(ConfigSource::Default));
    }

    #[tokio::test]
    async fn test_invalid_document_falls_back_to_default() {
        let store = MemoryStore::with_entries([(DEFAULT_CONFIG_KEY, r#"{"schemaVersion": "1.0"}"#)]);
        let resolver = ConfigResolver::new(Arc::new(store), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        let config = resolver.load_config().await;
        assert_eq!(*config, default_config());
        assert_eq!(resolver.source(), Some(ConfigSource::Default));
    }

    #[tokio::test]
    async fn test_loads_and_caches_store_document() {
        let store = Arc::new(CountingStore {
            inner: seeded(),
            reads: AtomicUsize::new(0),
        });
        let resolver = ConfigResolver::new(store.clone(), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        let first = resolver.load_config().await;
        let second = resolver.load_config().await;
        assert_eq!(first.upstream_version, "v3");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.source(), Some(ConfigSource::Store));
    }

    #[tokio::test]
    async fn test_expired_cache_rereads_store() {
        let store = Arc::new(CountingStore {
            inner: seeded(),
            reads: AtomicUsize::new(0),
        });
        let resolver = ConfigResolver::new(store.clone(), DEFAULT_CONFIG_KEY, Duration::from_millis(20));

        resolver.load_config().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        resolver.load_config().await;
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_expiry_reads_store_once() {
        let store = Arc::new(CountingStore {
            inner: seeded(),
            reads: AtomicUsize::new(0),
        });
        let resolver = Arc::new(ConfigResolver::new(store.clone(), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let resolver = Arc::clone(&resolver);
                tokio::spawn(async move { resolver.load_config().await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reload_picks_up_new_document() {
        let store = Arc::new(MemoryStore::new());
        let resolver = ConfigResolver::new(store.clone(), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        assert_eq!(resolver.load_config().await.upstream_version, "v2");
        store.put(DEFAULT_CONFIG_KEY, DOCUMENT).await.unwrap();
        // Still cached.
        assert_eq!(resolver.load_config().await.upstream_version, "v2");

        let reloaded = resolver.reload().await;
        assert_eq!(reloaded.upstream_version, "v3");
        assert_eq!(resolver.source(), Some(ConfigSource::Store));
    }

    #[tokio::test]
    async fn test_references_are_substituted() {
        let resolver = ConfigResolver::new(Arc::new(seeded()), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        let v1 = resolver.get_version_transformation("v1").await.unwrap();
        assert_eq!(v1.request.source, "{\"id\": user_id}");
        // Unresolvable references are left as-is.
        assert_eq!(v1.response.source, "ref:exprs/missing");

        // The cached document keeps the reference form.
        let config = resolver.load_config().await;
        assert_eq!(config.transformation("v1").unwrap().request.source, "ref:exprs/v1-request");
        assert!(resolver.get_version_transformation("v2").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_default_version_falls_back() {
        let doc = DOCUMENT.replace(r#""defaultVersion": "v1""#, r#""defaultVersion": "v0""#);
        let store = MemoryStore::with_entries([(DEFAULT_CONFIG_KEY, doc.as_str())]);
        let resolver = ConfigResolver::new(Arc::new(store), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        assert_eq!(*resolver.load_config().await, default_config());
        assert_eq!(resolver.source(), Some(ConfigSource::Default));
    }

    #[tokio::test]
    async fn test_resolve_against_held_snapshot() {
        let store = Arc::new(seeded());
        let resolver = ConfigResolver::new(store.clone(), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);
        let snapshot = resolver.load_config().await;

        // A newer document does not leak into lookups against the held snapshot.
        store.put(DEFAULT_CONFIG_KEY, &default_config_json()).await.unwrap();
        resolver.reload().await;

        let v1 = resolver.resolve_transformation(&snapshot, "v1").await.unwrap();
        assert_eq!(v1.request.source, "{\"id\": user_id}");
        assert!(resolver.resolve_transformation(&snapshot, "v2").await.is_none());
        assert!(resolver.get_version_transformation("v2").await.is_some());
    }

    fn default_config_json() -> String {
        serde_json::to_string(&default_config()).unwrap()
    }

    #[tokio::test]
    async fn test_supported_versions_honour_routing() {
        let resolver = ConfigResolver::new(Arc::new(seeded()), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);

        assert_eq!(resolver.get_supported_versions("/legacy").await, vec!["v1"]);
        assert_eq!(resolver.get_supported_versions("/users").await, vec!["v1", "v3"]);
    }

    #[tokio::test]
    async fn test_status_reports_slot() {
        let resolver = ConfigResolver::new(Arc::new(seeded()), DEFAULT_CONFIG_KEY, DEFAULT_CACHE_TTL);
        assert!(!resolver.status().cached);

        resolver.load_config().await;
        let status = resolver.status();
        assert!(status.cached);
        assert_eq!(status.source, Some(ConfigSource::Store));
        assert_eq!(status.ttl_secs, 3600);

        resolver.clear_cache();
        assert!(!resolver.status().cached);
    }
}
