//! Artifact cache with TTL expiration and LRU eviction.
//!
//! Holds raw object bytes keyed by artifact key. The cache is read-through
//! only: the router inserts after a successful fetch and never writes back.
//!
//! Cache statistics (hits, misses, evictions) are emitted as `tracing`
//! fields on every lookup.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use dockyard_core::config::RouterConfig;

#[derive(Clone, Debug)]
pub struct ArtifactCacheConfig {
    /// Time-to-live for cache entries (default: 1 hour).
    pub ttl: Duration,
    /// Maximum number of entries in the cache (default: 500).
    pub max_entries: usize,
}

impl Default for ArtifactCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            max_entries: 500,
        }
    }
}

impl From<&RouterConfig> for ArtifactCacheConfig {
    fn from(config: &RouterConfig) -> Self {
        Self {
            ttl: config.cache_ttl(),
            max_entries: config.cache_capacity,
        }
    }
}

struct CacheEntry {
    data: Bytes,
    inserted_at: Instant,
    /// Nanos since cache creation, for LRU ordering.
    last_accessed_nanos: AtomicU64,
}

impl CacheEntry {
    fn new(data: Bytes, epoch: Instant) -> Self {
        let now = Instant::now();
        Self {
            data,
            inserted_at: now,
            last_accessed_nanos: AtomicU64::new(now.duration_since(epoch).as_nanos() as u64),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.inserted_at.elapsed() > ttl
    }

    fn touch(&self, epoch: Instant) {
        let nanos = Instant::now().duration_since(epoch).as_nanos() as u64;
        self.last_accessed_nanos.store(nanos, Ordering::Relaxed);
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded in-memory cache of artifact bytes.
///
/// Not internally synchronized; the router wraps it in a `Mutex` and never
/// holds the lock across an await.
pub struct ArtifactCache {
    entries: HashMap<String, CacheEntry>,
    config: ArtifactCacheConfig,
    epoch: Instant,
    stats: CacheStats,
}

impl ArtifactCache {
    pub fn new(config: ArtifactCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            epoch: Instant::now(),
            stats: CacheStats::default(),
        }
    }

    /// Look up a key. Expired entries are removed and count as misses.
    pub fn get(&mut self, key: &str) -> Option<Bytes> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(self.config.ttl) => {
                entry.touch(self.epoch);
                self.stats.hits += 1;
                tracing::debug!(
                    %key,
                    cache_hits = self.stats.hits,
                    cache_misses = self.stats.misses,
                    cache_evictions = self.stats.evictions,
                    "artifact cache hit"
                );
                return Some(entry.data.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
        }
        self.stats.misses += 1;
        tracing::debug!(
            %key,
            expired,
            cache_hits = self.stats.hits,
            cache_misses = self.stats.misses,
            cache_evictions = self.stats.evictions,
            "artifact cache miss"
        );
        None
    }

    /// Insert or replace an entry, evicting the least-recently-used one
    /// when full.
    pub fn insert(&mut self, key: &str, data: Bytes) {
        if self.config.max_entries == 0 {
            return;
        }
        if !self.entries.contains_key(key) && self.entries.len() >= self.config.max_entries {
            self.evict_lru();
        }
        self.entries
            .insert(key.to_string(), CacheEntry::new(data, self.epoch));
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed_nanos.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());

        if let Some(key) = lru_key {
            self.entries.remove(&key);
            self.stats.evictions += 1;
            tracing::debug!(
                evicted_key = %key,
                cache_evictions = self.stats.evictions,
                "artifact cache LRU eviction"
            );
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn cache(ttl: Duration, max_entries: usize) -> ArtifactCache {
        ArtifactCache::new(ArtifactCacheConfig { ttl, max_entries })
    }

    #[test]
    fn defaults_match_router_config() {
        let config = ArtifactCacheConfig::from(&RouterConfig::default());
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.max_entries, 500);
        assert_eq!(config.ttl, ArtifactCacheConfig::default().ttl);
    }

    #[test]
    fn insert_then_hit() {
        let mut cache = cache(Duration::from_secs(30), 10);
        cache.insert("dist/a/index.html", Bytes::from_static(b"<html>"));

        assert_eq!(cache.get("dist/a/index.html").unwrap(), Bytes::from_static(b"<html>"));
        assert!(cache.get("dist/a/other.html").is_none());
        assert_eq!(
            cache.stats(),
            CacheStats {
                hits: 1,
                misses: 1,
                evictions: 0
            }
        );
    }

    #[test]
    fn insert_replaces_existing_entry() {
        let mut cache = cache(Duration::from_secs(30), 1);
        cache.insert("k", Bytes::from_static(b"old"));
        cache.insert("k", Bytes::from_static(b"new"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k").unwrap(), Bytes::from_static(b"new"));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn entry_expires_after_ttl() {
        let mut cache = cache(Duration::from_millis(50), 10);
        cache.insert("k", Bytes::from_static(b"v"));
        assert!(cache.get("k").is_some());

        thread::sleep(Duration::from_millis(80));

        assert!(cache.get("k").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let mut cache = cache(Duration::from_secs(30), 2);
        cache.insert("a", Bytes::from_static(b"a"));
        thread::sleep(Duration::from_millis(2));
        cache.insert("b", Bytes::from_static(b"b"));
        thread::sleep(Duration::from_millis(2));

        // Touch "a" so "b" becomes the oldest.
        assert!(cache.get("a").is_some());
        thread::sleep(Duration::from_millis(2));
        cache.insert("c", Bytes::from_static(b"c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut cache = cache(Duration::from_secs(30), 0);
        cache.insert("k", Bytes::from_static(b"v"));
        assert!(cache.get("k").is_none());
    }
}
