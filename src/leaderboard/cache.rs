//! Generation-versioned query cache
//!
//! Every key is scoped by the generation observed when the lookup started:
//! `(shape, generation, params)`. A committed write bumps the generation,
//! which makes every older key unreachable in O(1). Abandoned entries are
//! never deleted explicitly; their TTL reclaims them.
//!
//! ## Correctness rule
//!
//! The generation used for `put` must be the one returned by the `get` that
//! missed, i.e. read *before* the store query. A payload computed across a
//! bump then lands under the old generation, where no later reader looks.
//!
//! ## Backends
//!
//! - `MokaCacheBackend`: in-process, per-entry TTL, bounded capacity
//! - `NoopCacheBackend`: always misses (caching disabled)
//!
//! A backend error is logged and treated as a miss; it never fails a query.

use super::config::LeaderboardConfig;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default lifetime of a cached result
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Query family a cached payload belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryShape {
    /// Top-N list, params = limit
    Top,
    /// Single player standing, params = player id
    Rank,
}

impl QueryShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryShape::Top => "top",
            QueryShape::Rank => "rank",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub shape: QueryShape,
    pub generation: u64,
    pub params: String,
}

impl CacheKey {
    pub fn new(shape: QueryShape, generation: u64, params: impl Into<String>) -> Self {
        Self {
            shape,
            generation,
            params: params.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "leaderboard:{}:g{}:{}", self.shape.as_str(), self.generation, self.params)
    }
}

/// Serialized payload plus bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Arc<str>,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Storage behind the versioned cache
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError>;

    async fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError>;

    /// Backend name for logging
    fn backend_type(&self) -> &'static str;
}

struct EntryExpiry;

impl moka::Expiry<CacheKey, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process backend on top of `moka`
pub struct MokaCacheBackend {
    inner: moka::future::Cache<CacheKey, CacheEntry>,
}

impl MokaCacheBackend {
    pub fn new(max_entries: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl CacheBackend for MokaCacheBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self
            .inner
            .get(key)
            .await
            .filter(|entry| !entry.is_expired(Instant::now())))
    }

    async fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<(), CacheError> {
        self.inner.insert(key, entry).await;
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "moka"
    }
}

/// Always-miss backend used when caching is disabled
pub struct NoopCacheBackend;

#[async_trait]
impl CacheBackend for NoopCacheBackend {
    async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: CacheKey, _entry: CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }

    fn backend_type(&self) -> &'static str {
        "noop"
    }
}

/// Result of a cache lookup
///
/// `generation` is the generation the lookup was scoped to; pass it back to
/// `put` when repopulating after a miss.
#[derive(Debug, Clone)]
pub struct Lookup<T> {
    pub generation: u64,
    pub payload: Option<T>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub generation: u64,
}

/// Cache layer shared by the aggregation engine and query service
pub struct VersionedCache {
    backend: Arc<dyn CacheBackend>,
    generation: AtomicU64,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl VersionedCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            generation: AtomicU64::new(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Select the backend from configuration
    pub fn from_config(config: &LeaderboardConfig) -> Self {
        let backend: Arc<dyn CacheBackend> = if config.cache_enabled {
            Arc::new(MokaCacheBackend::new(config.cache_max_entries))
        } else {
            Arc::new(NoopCacheBackend)
        };
        Self::new(backend, config.cache_ttl())
    }

    pub fn disabled() -> Self {
        Self::new(Arc::new(NoopCacheBackend), DEFAULT_CACHE_TTL)
    }

    pub fn backend_type(&self) -> &'static str {
        self.backend.backend_type()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Advance the generation, returning the new value
    pub fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Look up `(shape, params)` under the current generation
    pub async fn get<T: DeserializeOwned>(&self, shape: QueryShape, params: &str) -> Lookup<T> {
        let generation = self.current_generation();
        let key = CacheKey::new(shape, generation, params);

        let payload = match self.backend.get(&key).await {
            Ok(Some(entry)) => match serde_json::from_str::<T>(&entry.payload) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("⚠️  Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::warn!("⚠️  Cache lookup failed for {} (treating as miss): {}", key, e);
                None
            }
        };

        if payload.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("🎯 Cache hit: {}", key);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::debug!("💨 Cache miss: {}", key);
        }

        Lookup { generation, payload }
    }

    /// Store a payload with the default TTL
    pub async fn put<T: Serialize>(&self, shape: QueryShape, params: &str, generation: u64, payload: &T) {
        self.put_with_ttl(shape, params, generation, payload, self.ttl).await;
    }

    pub async fn put_with_ttl<T: Serialize>(
        &self,
        shape: QueryShape,
        params: &str,
        generation: u64,
        payload: &T,
        ttl: Duration,
    ) {
        let key = CacheKey::new(shape, generation, params);

        let serialized = match serde_json::to_string(payload) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("⚠️  Failed to encode cache payload for {}: {}", key, e);
                return;
            }
        };

        let entry = CacheEntry {
            payload: Arc::from(serialized),
            stored_at: Instant::now(),
            ttl,
        };

        if let Err(e) = self.backend.put(key.clone(), entry).await {
            log::warn!("⚠️  Cache store failed for {}: {}", key, e);
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            generation: self.current_generation(),
        }
    }
}
