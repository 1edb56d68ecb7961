//! Bounded response cache with LRU eviction and per-entry TTL.
//!
//! One mutex guards both the map and the recency order, so `get` takes it
//! exclusively: a hit reorders the list. Expired entries are invisible to
//! `get` and are removed either on the lookup that finds them or by the
//! periodic sweep, whichever comes first.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use relay_types::cache::{CacheStats, CachedValue};

/// A cached value with its freshness metadata.
#[derive(Debug)]
struct CacheEntry {
    value: CachedValue,
    created_at: Instant,
    ttl: Duration,
    use_count: u64,
}

impl CacheEntry {
    fn new(value: CachedValue, ttl: Duration) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
            use_count: 0,
        }
    }

    /// Shared by `get` and the sweep.
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }
}

/// LRU + TTL cache for completions and conversation summaries.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            capacity: capacity.get(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Look up `key`, promoting it to most-recently-used on a hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("response cache lock poisoned");

        match entries.get_mut(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) if !entry.is_expired(now) => {
                entry.use_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        entries.pop(key);
        self.expirations.fetch_add(1, Ordering::Relaxed);
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, "cache entry expired on lookup");
        None
    }

    /// Insert or overwrite `key`.
    ///
    /// Overwriting refreshes the value, timestamp, TTL and recency. Inserting
    /// a new key into a full cache evicts exactly the least-recently-used
    /// entry.
    pub fn set(&self, key: impl Into<String>, value: CachedValue, ttl: Duration) {
        let key = key.into();
        let mut entries = self.entries.lock().expect("response cache lock poisoned");

        if let Some(entry) = entries.get_mut(&key) {
            *entry = CacheEntry::new(value, ttl);
            return;
        }

        if let Some((evicted, _)) = entries.push(key, CacheEntry::new(value, ttl)) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(evicted = %evicted, "cache at capacity, evicted LRU entry");
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("response cache lock poisoned");

        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        let count = expired.len();
        self.expirations.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Run `purge_expired` every `interval` until cancelled.
    pub async fn run_sweeper(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = self.purge_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.len(), "purged expired cache entries");
                    }
                }
            }
        }
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("response cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many times `key` has been served, without touching its recency.
    pub fn use_count(&self, key: &str) -> Option<u64> {
        self.entries
            .lock()
            .expect("response cache lock poisoned")
            .peek(key)
            .map(|entry| entry.use_count)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            capacity: self.capacity,
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            expirations: self.expirations(),
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("capacity", &self.capacity)
            .field("entries", &self.len())
            .finish()
    }
}
