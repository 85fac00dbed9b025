//! Two-level response cache.
//!
//! L1 is an in-process LRU with per-entry TTL. L2 is an optional shared
//! key-value store reached through the [`RemoteCache`] trait; entries there
//! are opaque bytes (the serialized response). Reads go L1 → L2; an L2 hit
//! repopulates L1. Every operation is best-effort: an L2 failure is counted
//! and treated as a miss, never surfaced to the request.
//!
//! Expired L1 entries are left in place on a fresh-read miss. The
//! dispatcher's deadline fallback may still serve them through
//! [`TieredCache::get_stale`]; LRU pressure or an overwrite removes them
//! eventually.

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use lru::LruCache;
use serde_json::Value;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum L1 entries before LRU eviction.
    pub l1_max_entries: usize,
    /// Default L1 TTL when the caller does not pick one.
    pub l1_default_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_max_entries: 10_000,
            l1_default_ttl: Duration::from_secs(300),
        }
    }
}

/// Cache entry with expiry stamp and an advisory size.
struct CacheEntry {
    value: Arc<Value>,
    expires_at: Instant,
    size_hint: usize,
}

/// In-process LRU response cache with TTL expiration.
pub struct ResponseCache {
    inner: RwLock<LruCache<String, CacheEntry>>,
    default_ttl: Duration,
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` responses.
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(max_entries.max(1)).expect("max_entries must be positive");
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
            default_ttl,
        }
    }

    /// Get a fresh entry. Expired entries are skipped but kept in place for
    /// [`ResponseCache::get_stale`].
    pub fn get(&self, key: &str) -> Option<Arc<Value>> {
        let mut cache = self.inner.write().ok()?;
        let entry = cache.get(key)?;
        if entry.expires_at > Instant::now() {
            return Some(entry.value.clone());
        }
        None
    }

    /// Get an entry regardless of freshness.
    pub fn get_stale(&self, key: &str) -> Option<Arc<Value>> {
        let mut cache = self.inner.write().ok()?;
        cache.get(key).map(|entry| entry.value.clone())
    }

    /// Insert with an explicit TTL. A later write of the same key overwrites.
    pub fn insert(&self, key: String, value: Arc<Value>, ttl: Duration) {
        let size_hint = estimate_size(&value);
        if let Ok(mut cache) = self.inner.write() {
            cache.put(
                key,
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                    size_hint,
                },
            );
        }
    }

    /// Insert with the default TTL.
    pub fn insert_default(&self, key: String, value: Arc<Value>) {
        self.insert(key, value, self.default_ttl);
    }

    /// Remove an entry.
    pub fn remove(&self, key: &str) {
        if let Ok(mut cache) = self.inner.write() {
            cache.pop(key);
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        if let Ok(mut cache) = self.inner.write() {
            cache.clear();
        }
    }

    /// Current entry count, expired entries included.
    pub fn len(&self) -> usize {
        self.inner.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of stored size hints, for the stats surface.
    pub fn size_hint_bytes(&self) -> usize {
        self.inner
            .read()
            .map(|c| c.iter().map(|(_, e)| e.size_hint).sum())
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("len", &self.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

fn estimate_size(value: &Value) -> usize {
    // Cheap structural estimate; exact byte size is not needed.
    match value {
        Value::Null | Value::Bool(_) => 4,
        Value::Number(_) => 8,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(estimate_size).sum::<usize>() + 2,
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| k.len() + estimate_size(v))
            .sum::<usize>()
            + 2,
    }
}

/// Shared (L2) cache over opaque bytes.
///
/// Implementations must be tenant-agnostic: the namespaced key already
/// carries the tenant prefix, and no operation iterates keys.
#[async_trait]
pub trait RemoteCache: Send + Sync + std::fmt::Debug {
    /// Fetch the bytes stored under `key`, if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key` with a server-side TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Drop all entries this gateway wrote. Best-effort.
    async fn clear(&self) -> Result<()>;

    /// Cheap liveness probe for the health monitor.
    async fn ping(&self) -> bool;
}

/// Which tier served a cache hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    L1,
    L2,
}

impl CacheTier {
    /// Stable label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::L1 => "l1",
            CacheTier::L2 => "l2",
        }
    }
}

/// Outcome of a tiered read.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    /// The cached response, if any tier had it fresh.
    pub value: Option<Arc<Value>>,
    /// Tier that served the value.
    pub tier: Option<CacheTier>,
    /// Whether the L2 read failed (recorded, treated as miss).
    pub l2_fault: bool,
}

impl CacheLookup {
    fn miss(l2_fault: bool) -> Self {
        Self {
            value: None,
            tier: None,
            l2_fault,
        }
    }

    fn hit(value: Arc<Value>, tier: CacheTier) -> Self {
        Self {
            value: Some(value),
            tier: Some(tier),
            l2_fault: false,
        }
    }
}

/// Outcome of a tiered write.
#[derive(Debug, Clone, Copy)]
pub struct CacheWrite {
    /// Whether the L2 write failed (recorded, swallowed).
    pub l2_fault: bool,
}

/// Read-through two-level cache.
pub struct TieredCache {
    l1: ResponseCache,
    l2: Option<Arc<dyn RemoteCache>>,
}

impl TieredCache {
    /// Create a tiered cache. `l2` is `None` when the shared tier is
    /// disabled by configuration.
    pub fn new(config: &CacheConfig, l2: Option<Arc<dyn RemoteCache>>) -> Self {
        Self {
            l1: ResponseCache::new(config.l1_max_entries, config.l1_default_ttl),
            l2,
        }
    }

    /// Whether the shared tier is configured.
    pub fn l2_enabled(&self) -> bool {
        self.l2.is_some()
    }

    /// The shared tier handle, for health probing.
    pub fn l2(&self) -> Option<&Arc<dyn RemoteCache>> {
        self.l2.as_ref()
    }

    /// The in-process tier, for the stats surface.
    pub fn l1(&self) -> &ResponseCache {
        &self.l1
    }

    /// Read through both tiers.
    pub async fn get(&self, key: &str) -> CacheLookup {
        if let Some(value) = self.l1.get(key) {
            return CacheLookup::hit(value, CacheTier::L1);
        }

        let Some(l2) = &self.l2 else {
            return CacheLookup::miss(false);
        };

        match l2.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(value) => {
                    let value = Arc::new(value);
                    self.l1.insert_default(key.to_string(), value.clone());
                    CacheLookup::hit(value, CacheTier::L2)
                }
                Err(e) => {
                    tracing::warn!(key, error = %e, "malformed L2 cache entry");
                    CacheLookup::miss(true)
                }
            },
            Ok(None) => CacheLookup::miss(false),
            Err(e) => {
                tracing::warn!(key, error = %e, "L2 cache read failed");
                CacheLookup::miss(true)
            }
        }
    }

    /// L1-only read ignoring freshness, for the deadline fallback.
    pub fn get_stale(&self, key: &str) -> Option<Arc<Value>> {
        self.l1.get_stale(key)
    }

    /// Write both tiers. L1 always; L2 when enabled, failures swallowed.
    pub async fn set(&self, key: &str, value: Arc<Value>, ttl: Duration) -> CacheWrite {
        self.l1.insert(key.to_string(), value.clone(), ttl);

        let Some(l2) = &self.l2 else {
            return CacheWrite { l2_fault: false };
        };

        let bytes = match serde_json::to_vec(value.as_ref()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "response not serializable for L2");
                return CacheWrite { l2_fault: true };
            }
        };

        match l2.set(key, &bytes, ttl).await {
            Ok(()) => CacheWrite { l2_fault: false },
            Err(e) => {
                tracing::warn!(key, error = %e, "L2 cache write failed");
                CacheWrite { l2_fault: true }
            }
        }
    }

    /// Best-effort delete on both tiers.
    pub async fn delete(&self, key: &str) {
        self.l1.remove(key);
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.delete(key).await {
                tracing::warn!(key, error = %e, "L2 cache delete failed");
            }
        }
    }

    /// Best-effort clear on both tiers.
    pub async fn clear(&self) {
        self.l1.clear();
        if let Some(l2) = &self.l2 {
            if let Err(e) = l2.clear().await {
                tracing::warn!(error = %e, "L2 cache clear failed");
            }
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("l1", &self.l1)
            .field("l2_enabled", &self.l2.is_some())
            .finish()
    }
}

/// In-memory [`RemoteCache`] for tests and single-node development setups.
///
/// Honors TTLs with wall-clock expiry and supports fault injection so the
/// degradation paths can be exercised.
#[derive(Debug, Default)]
pub struct MemoryRemoteCache {
    entries: parking_lot::Mutex<std::collections::HashMap<String, (Vec<u8>, Instant)>>,
    failing: std::sync::atomic::AtomicBool,
}

impl MemoryRemoteCache {
    /// An empty, healthy store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail, simulating an outage.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(GatewayError::cache_fault("remote cache unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteCache for MemoryRemoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check()?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((bytes, expires_at)) if *expires_at > Instant::now() => Ok(Some(bytes.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.check()?;
        self.entries
            .lock()
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.check()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.check()?;
        self.entries.lock().clear();
        Ok(())
    }

    async fn ping(&self) -> bool {
        self.check().is_ok()
    }
}
