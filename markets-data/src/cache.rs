//! In-memory response cache with per-entry time-to-live.
//!
//! Entries expire lazily: an expired entry is only evicted when it is read. There is no
//! background sweep and nothing survives a restart.
//!
//! Every [`ResponseCache::clear`] starts a new generation. Writers that captured an older
//! generation before awaiting a response have their [`ResponseCache::set_in_generation`]
//! dropped, so a response requested before a clear never repopulates the cache.

use fnv::FnvHashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default TTL for 24h ticker snapshots.
pub const DEFAULT_TICKER_TTL: Duration = Duration::from_secs(30);

/// Default TTL for funding rate snapshots (funding moves far slower than price).
pub const DEFAULT_FUNDING_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    data: V,
    fetched_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) > self.ttl
    }
}

/// Hit / miss counters, logged at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

/// Key -> value store where every entry carries its own TTL.
#[derive(Debug, Clone)]
pub struct ResponseCache<V> {
    entries: FnvHashMap<String, CacheEntry<V>>,
    generation: u64,
    stats: CacheStats,
}

impl<V> Default for ResponseCache<V> {
    fn default() -> Self {
        Self {
            entries: FnvHashMap::default(),
            generation: 0,
            stats: CacheStats::default(),
        }
    }
}

impl<V: Clone> ResponseCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a live value for `key`, evicting it if it has expired.
    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// [`Self::get`] evaluated at an explicit point in time.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        let Some(entry) = self.entries.get(key) else {
            self.stats.misses += 1;
            debug!(key, "cache miss");
            return None;
        };

        if entry.is_expired(now) {
            self.entries.remove(key);
            self.stats.misses += 1;
            self.stats.expirations += 1;
            debug!(key, "cache entry expired");
            return None;
        }

        self.stats.hits += 1;
        debug!(key, "cache hit");
        Some(entry.data.clone())
    }

    /// Store `value` under `key`, unconditionally overwriting any previous entry.
    pub fn set(&mut self, key: impl Into<String>, value: V, ttl: Duration) {
        self.set_at(key, value, ttl, Instant::now())
    }

    /// [`Self::set`] with an explicit fetch time.
    pub fn set_at(&mut self, key: impl Into<String>, value: V, ttl: Duration, now: Instant) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                data: value,
                fetched_at: now,
                ttl,
            },
        );
    }

    /// Store `value` only if no [`Self::clear`] happened since `generation` was read.
    /// Returns whether the value was stored.
    pub fn set_in_generation(
        &mut self,
        generation: u64,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
    ) -> bool {
        if generation != self.generation {
            let key = key.into();
            debug!(
                %key,
                generation,
                current = self.generation,
                "dropping write from cleared generation"
            );
            return false;
        }

        self.set(key, value, ttl);
        true
    }

    /// Current generation, advanced by every [`Self::clear`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Remove every entry and start a new generation.
    pub fn clear(&mut self) {
        debug!(entries = self.entries.len(), "clearing response cache");
        self.entries.clear();
        self.generation += 1;
    }

    /// Whether an entry (live or expired) is currently held for `key`. Does not evict.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
