//! Byte-budgeted LRU cache of evaluated arrays.

use std::fmt;

use arrow::array::{Array, ArrayRef};
use lru::LruCache;

use crate::lazy::LazyArray;

/// Default cache budget for catalog arrays: 1 GB.
pub const CACHE_SIZE: usize = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Upper bound on the summed Arrow memory size of cached arrays.
    pub capacity_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: CACHE_SIZE,
        }
    }
}

/// Counters describing cache activity since creation (or the last `clear`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub evictions: u64,
    /// Arrays larger than the whole budget; never stored.
    pub rejected: u64,
    /// Lookups whose key matched an entry stored for a different computation.
    pub collisions: u64,
}

struct CachedArray {
    node: LazyArray,
    array: ArrayRef,
    bytes: usize,
}

/// Maps structural graph keys to evaluated arrays.
///
/// Each entry keeps the node it was computed from, and a lookup only hits when the
/// requested node is the same computation. Eviction only ever forces
/// recomputation; a lookup never returns a value for a different computation than
/// the one it was stored for. Byte accounting covers the cached arrays, not the
/// retained nodes.
pub struct ArrayCache {
    entries: LruCache<u64, CachedArray>,
    capacity_bytes: usize,
    used_bytes: usize,
    stats: CacheStats,
}

impl ArrayCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: LruCache::unbounded(),
            capacity_bytes: config.capacity_bytes,
            used_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_bytes
    }

    pub fn used_bytes(&self) -> usize {
        self.used_bytes
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

    /// Whether an entry for exactly `node` is cached, without touching recency.
    pub fn contains(&self, key: u64, node: &LazyArray) -> bool {
        self.entries
            .peek(&key)
            .is_some_and(|entry| entry.node.same_computation(node))
    }

    /// Look up the value of `node` stored under `key`, marking it most recently used.
    pub fn get(&mut self, key: u64, node: &LazyArray) -> Option<ArrayRef> {
        match self.entries.get(&key) {
            Some(entry) if entry.node.same_computation(node) => {
                self.stats.hits += 1;
                Some(entry.array.clone())
            }
            Some(_) => {
                self.stats.collisions += 1;
                self.stats.misses += 1;
                tracing::debug!(key, "cache key shared by distinct computations");
                None
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store the value of `node` under `key`, replacing whatever the key held, and
    /// evict least recently used entries until the budget holds again.
    pub fn insert(&mut self, key: u64, node: LazyArray, array: ArrayRef) {
        let bytes = array.get_array_memory_size();
        if bytes > self.capacity_bytes {
            self.stats.rejected += 1;
            tracing::trace!(key, bytes, capacity = self.capacity_bytes, "array exceeds cache budget");
            return;
        }

        if let Some(previous) = self.entries.put(key, CachedArray { node, array, bytes }) {
            self.used_bytes -= previous.bytes;
        }
        self.used_bytes += bytes;
        self.stats.insertions += 1;

        while self.used_bytes > self.capacity_bytes {
            match self.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    self.used_bytes -= evicted.bytes;
                    self.stats.evictions += 1;
                    tracing::trace!(key = evicted_key, bytes = evicted.bytes, "evicted cached array");
                }
                None => break,
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.used_bytes = 0;
        self.stats = CacheStats::default();
    }
}

impl fmt::Debug for ArrayCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayCache")
            .field("entries", &self.entries.len())
            .field("used_bytes", &self.used_bytes)
            .field("capacity_bytes", &self.capacity_bytes)
            .field("stats", &self.stats)
            .finish()
    }
}
