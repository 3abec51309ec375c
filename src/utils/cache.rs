//! In-Memory TTL Cache
//!
//! Thread-safe memoisation layer for database results.
//! Uses DashMap for concurrent access without lock contention.
//!
//! Features:
//! - TTL-based expiration (`API_CACHE_TIMEOUT`, 900s default)
//! - Cache HIT/MISS logging
//! - Hit/miss counters for the health endpoint

use dashmap::DashMap;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default TTL: 15 minutes
pub const DEFAULT_TTL_SECS: u64 = 900;

/// Cache entry with its insertion time
#[derive(Clone, Debug)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }

    /// Seconds left before expiry
    pub fn remaining_ttl(&self) -> u64 {
        self.ttl.saturating_sub(self.created_at.elapsed()).as_secs()
    }
}

/// Shared TTL cache. Clones share storage and counters.
#[derive(Clone)]
pub struct TtlCache<K, V> {
    store: Arc<DashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl<K, V> Default for TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::with_ttl(Duration::from_secs(DEFAULT_TTL_SECS))
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            ttl,
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the value when present and not expired. Expired entries are
    /// dropped and count as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        if let Some(entry) = self.store.get(key) {
            if entry.is_expired() {
                drop(entry); // release the shard read lock before removing
                self.store.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!("📭 CACHE MISS (expired): {:?}", key);
                None
            } else {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "✅ CACHE HIT: {:?} (TTL: {}s remaining)",
                    key,
                    entry.remaining_ttl()
                );
                Some(entry.value.clone())
            }
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!("📭 CACHE MISS: {:?}", key);
            None
        }
    }

    pub fn set(&self, key: K, value: V) {
        debug!("💾 CACHE SET: {:?} (TTL: {}s)", key, self.ttl.as_secs());
        self.store.insert(key, CacheEntry::new(value, self.ttl));
    }

    pub fn invalidate(&self, key: &K) {
        self.store.remove(key);
        debug!("🗑️ CACHE INVALIDATE: {:?}", key);
    }

    /// Drops every expired entry, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.store.len());
        if removed > 0 {
            info!("🧹 CACHE CLEANUP: {} expired entries removed", removed);
        }
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        CacheStats {
            entries: self.store.len(),
            hits,
            misses,
            hit_rate,
            ttl_secs: self.ttl.as_secs(),
        }
    }

    pub fn clear(&self) {
        self.store.clear();
        info!("🗑️ CACHE CLEARED");
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_set_get() {
        let cache: TtlCache<u64, String> = TtlCache::default();
        cache.set(1, "rows".to_string());
        assert_eq!(cache.get(&1).as_deref(), Some("rows"));
    }

    #[test]
    fn test_cache_miss() {
        let cache: TtlCache<u64, String> = TtlCache::default();
        assert!(cache.get(&42).is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache: TtlCache<u64, String> = TtlCache::with_ttl(Duration::ZERO);
        cache.set(1, "rows".to_string());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&1).is_none());
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_cleanup_expired() {
        let cache: TtlCache<u64, u8> = TtlCache::with_ttl(Duration::ZERO);
        cache.set(1, 1);
        cache.set(2, 2);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.cleanup_expired(), 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_invalidate_and_clear() {
        let cache: TtlCache<u64, u8> = TtlCache::default();
        cache.set(1, 1);
        cache.set(2, 2);
        cache.invalidate(&1);
        assert!(cache.get(&1).is_none());
        cache.clear();
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache: TtlCache<u64, u8> = TtlCache::with_ttl(Duration::from_secs(60));
        cache.set(7, 1);
        cache.get(&7); // HIT
        cache.get(&8); // MISS

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate, 50.0);
        assert_eq!(stats.ttl_secs, 60);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache: TtlCache<u64, u8> = TtlCache::default();
        let other = cache.clone();
        cache.set(1, 9);
        assert_eq!(other.get(&1), Some(9));
    }
}
