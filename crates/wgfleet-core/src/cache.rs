// ── TTL/LRU cache ──
//
// Concurrent string-keyed cache with per-entry expiry and a size bound.
// Expired entries are dropped lazily on read; when a new key would
// overflow the bound, the least recently touched entry goes first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::trace;

struct Entry<V> {
    value: V,
    expires_at: Instant,
    /// Logical clock value of the last read or write.
    last_access: u64,
}

/// A concurrent TTL cache with least-recently-used eviction.
///
/// Reads and writes on different keys only contend on `DashMap` shards.
/// Admission of new keys takes a short lock so two concurrent inserts
/// cannot both squeeze past the size bound.
pub struct TtlCache<V> {
    entries: DashMap<String, Entry<V>>,
    max_size: usize,
    clock: AtomicU64,
    admission: Mutex<()>,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `max_size` entries (minimum 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_size: max_size.max(1),
            clock: AtomicU64::new(0),
            admission: Mutex::new(()),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    /// Look up `key`. An expired entry counts as a miss and is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let mut entry = self.entries.get_mut(key)?;
            if now <= entry.expires_at {
                entry.last_access = self.tick();
                return Some(entry.value.clone());
            }
        }
        if self
            .entries
            .remove_if(key, |_, entry| now > entry.expires_at)
            .is_some()
        {
            trace!(key, "cache entry expired");
        }
        None
    }

    /// Store `value` under `key` for `ttl`.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
            last_access: self.tick(),
        };

        let entry = match self.entries.get_mut(&key) {
            Some(mut existing) => {
                *existing = entry;
                return;
            }
            None => entry,
        };

        let _admission = self
            .admission
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.purge_expired();
            if self.entries.len() >= self.max_size {
                self.evict_least_recent();
            }
        }
        self.entries.insert(key, entry);
    }

    /// Drop one key.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every key containing `pattern`. Returns how many went.
    pub fn invalidate_pattern(&self, pattern: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.contains(pattern));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            trace!(pattern, removed, "cache entries invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, expired ones included until touched.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| now <= entry.expires_at);
    }

    fn evict_least_recent(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_access)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
            trace!(key = %key, "evicted least recently used cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn get_after_set_returns_value() {
        let cache = TtlCache::new(8);
        cache.set("peers:wg0", 7_u32, TTL);
        assert_eq!(cache.get("peers:wg0"), Some(7));
        assert_eq!(cache.get("peers:wg1"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_a_miss_and_is_evicted() {
        let cache = TtlCache::new(8);
        cache.set("interfaces:wireguard", "list", TTL);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get("interfaces:wireguard"), Some("list"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("interfaces:wireguard"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_evicts_least_recently_accessed() {
        let cache = TtlCache::new(3);
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.set("c", 3, TTL);

        // Touch "a" so "b" becomes the oldest.
        assert_eq!(cache.get("a"), Some(1));
        cache.set("d", 4, TTL);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn overwriting_existing_key_never_evicts() {
        let cache = TtlCache::new(2);
        cache.set("a", 1, TTL);
        cache.set("b", 2, TTL);
        cache.set("a", 10, TTL);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_make_room_before_lru() {
        let cache = TtlCache::new(2);
        cache.set("short", 1, Duration::from_secs(1));
        cache.set("long", 2, TTL);
        tokio::time::advance(Duration::from_secs(5)).await;

        cache.set("new", 3, TTL);
        assert_eq!(cache.get("long"), Some(2));
        assert_eq!(cache.get("new"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_pattern_is_substring_match() {
        let cache = TtlCache::new(8);
        cache.set("peers:wg0", 1, TTL);
        cache.set("peers:wg1", 2, TTL);
        cache.set("interfaces:wireguard", 3, TTL);

        assert_eq!(cache.invalidate_pattern("peers:"), 2);
        assert_eq!(cache.get("interfaces:wireguard"), Some(3));
        assert!(cache.invalidate("interfaces:wireguard"));
        assert!(!cache.invalidate("interfaces:wireguard"));

        cache.set("routes:all", 4, TTL);
        cache.clear();
        assert!(cache.is_empty());
    }
}
