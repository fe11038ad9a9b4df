//! In-memory result cache with per-entry TTL.
//! Eviction at capacity is by insertion order: reads use `peek`, so a hit
//! never refreshes an entry's position. Expired entries are dropped lazily
//! on read.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

pub struct ResultCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, CacheEntry<V>>>,
}

impl<K: Hash + Eq, V: Clone> ResultCache<K, V> {
    /// A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a live entry. Returns None if absent or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut cache = self.inner.lock();
        let expired = match cache.peek(key) {
            Some(entry) if !entry.is_expired(Instant::now()) => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            cache.pop(key);
        }
        None
    }

    /// Insert, evicting the oldest-inserted entry first when full.
    pub fn set(&self, key: K, value: V, ttl: Duration) {
        let mut cache = self.inner.lock();
        // Drop any previous entry so a re-insert counts as newest.
        cache.pop(&key);
        cache.push(
            key,
            CacheEntry {
                value,
                created_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }
}
