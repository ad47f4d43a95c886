//! Cost-based LRU cache for parsed hunks.
//!
//! Bounded by both total byte cost and entry count. All access goes through
//! one mutex, so hit/miss counters and eviction order are deterministic no
//! matter how many threads read from it.

use crate::diff::DiffHunk;
use lru::LruCache;
use parking_lot::Mutex;
use std::sync::Arc;

/// Identity of a cached hunk
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file: String,
    pub staged: bool,
    pub hunk_index: usize,
}

impl CacheKey {
    pub fn new(file: impl Into<String>, staged: bool, hunk_index: usize) -> Self {
        Self {
            file: file.into(),
            staged,
            hunk_index,
        }
    }
}

/// Entry payload: the hunk plus what it counts against the byte budget
#[derive(Debug, Clone)]
pub struct CachedHunk {
    pub hunk: Arc<DiffHunk>,
    pub cost: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    pub max_bytes: usize,
    pub max_entries: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            max_bytes: 64 * 1024 * 1024,
            max_entries: 4096,
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hit_count: u64,
    pub miss_count: u64,
    pub eviction_count: u64,
    pub total_bytes: usize,
    pub entries: usize,
}

struct Inner {
    entries: LruCache<CacheKey, CachedHunk>,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct DiffCache {
    limits: CacheLimits,
    inner: Mutex<Inner>,
}

impl DiffCache {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            limits,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Look up a hunk and mark it most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<DiffHunk>> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).map(|entry| entry.hunk.clone()) {
            Some(hunk) => {
                inner.hits += 1;
                Some(hunk)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Presence check that neither promotes nor counts as a hit/miss
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains(key)
    }

    /// Insert with the hunk's estimated size as its cost.
    pub fn put(&self, key: CacheKey, hunk: Arc<DiffHunk>) -> bool {
        let cost = hunk.estimated_bytes();
        self.put_with_cost(key, hunk, cost)
    }

    /// Insert or replace, then evict least-recently-used entries until both
    /// limits hold. An entry that alone exceeds the byte budget is refused
    /// (and any older value under the same key dropped); returns false then.
    pub fn put_with_cost(&self, key: CacheKey, hunk: Arc<DiffHunk>, cost: usize) -> bool {
        let mut inner = self.inner.lock();

        if let Some(old) = inner.entries.pop(&key) {
            inner.total_bytes -= old.cost;
        }

        if cost > self.limits.max_bytes || self.limits.max_entries == 0 {
            tracing::debug!(file = %key.file, hunk = key.hunk_index, cost, "hunk too large to cache");
            return false;
        }

        inner.entries.push(key, CachedHunk { hunk, cost });
        inner.total_bytes += cost;

        while inner.total_bytes > self.limits.max_bytes || inner.entries.len() > self.limits.max_entries {
            let Some((evicted, entry)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes -= entry.cost;
            inner.evictions += 1;
            tracing::trace!(file = %evicted.file, hunk = evicted.hunk_index, cost = entry.cost, "evicted hunk");
        }
        true
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.pop(key) {
            Some(entry) => {
                inner.total_bytes -= entry.cost;
                true
            }
            None => false,
        }
    }

    /// Drop every entry for `file` (both staged and unstaged).
    pub fn remove_file(&self, file: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.file == file)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            if let Some(entry) = inner.entries.pop(key) {
                inner.total_bytes -= entry.cost;
            }
        }
        keys.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.total_bytes = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hit_count: inner.hits,
            miss_count: inner.misses,
            eviction_count: inner.evictions,
            total_bytes: inner.total_bytes,
            entries: inner.entries.len(),
        }
    }

    /// Keys from least to most recently used
    #[cfg(test)]
    fn keys_lru_first(&self) -> Vec<CacheKey> {
        let inner = self.inner.lock();
        let mut keys: Vec<CacheKey> = inner.entries.iter().map(|(k, _)| k.clone()).collect();
        keys.reverse();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{HunkBody, HunkHeader};

    fn hunk(file: &str, index: usize) -> Arc<DiffHunk> {
        Arc::new(DiffHunk {
            file: file.to_string(),
            index,
            header: HunkHeader {
                old_start: 1,
                old_count: 1,
                new_start: 1,
                new_count: 1,
                section: String::new(),
            },
            byte_range: 0..1,
            line_count: 0,
            additions: 0,
            deletions: 0,
            split_rows: 0,
            body: HunkBody::Deferred,
            word_diffed: false,
            is_collapsed: false,
        })
    }

    fn key(file: &str, index: usize) -> CacheKey {
        CacheKey::new(file, false, index)
    }

    fn cache(max_bytes: usize, max_entries: usize) -> DiffCache {
        DiffCache::new(CacheLimits {
            max_bytes,
            max_entries,
        })
    }

    #[test]
    fn byte_budget_evicts_oldest_first() {
        let cache = cache(100, 10);
        assert!(cache.put_with_cost(key("a", 0), hunk("a", 0), 40));
        assert!(cache.put_with_cost(key("a", 1), hunk("a", 1), 40));
        assert!(cache.put_with_cost(key("a", 2), hunk("a", 2), 40));

        assert!(!cache.contains(&key("a", 0)));
        assert!(cache.contains(&key("a", 1)));
        assert!(cache.contains(&key("a", 2)));
        let stats = cache.stats();
        assert_eq!(stats.total_bytes, 80);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.eviction_count, 1);
    }

    #[test]
    fn get_promotes_to_most_recent() {
        let cache = cache(100, 10);
        cache.put_with_cost(key("a", 0), hunk("a", 0), 40);
        cache.put_with_cost(key("a", 1), hunk("a", 1), 40);
        assert!(cache.get(&key("a", 0)).is_some());
        cache.put_with_cost(key("a", 2), hunk("a", 2), 40);

        // Entry 1 was the least recently used, so it went instead of 0
        assert!(cache.contains(&key("a", 0)));
        assert!(!cache.contains(&key("a", 1)));
        assert_eq!(cache.keys_lru_first(), vec![key("a", 0), key("a", 2)]);
    }

    #[test]
    fn entry_count_limit() {
        let cache = cache(1_000, 2);
        for i in 0..5 {
            cache.put_with_cost(key("f", i), hunk("f", i), 1);
        }
        assert_eq!(cache.keys_lru_first(), vec![key("f", 3), key("f", 4)]);
        assert_eq!(cache.stats().eviction_count, 3);
    }

    #[test]
    fn hits_and_misses_are_counted() {
        let cache = cache(100, 10);
        cache.put_with_cost(key("a", 0), hunk("a", 0), 10);
        cache.get(&key("a", 0));
        cache.get(&key("a", 0));
        cache.get(&key("b", 0));
        let stats = cache.stats();
        assert_eq!((stats.hit_count, stats.miss_count), (2, 1));
    }

    #[test]
    fn replacing_a_key_updates_cost() {
        let cache = cache(100, 10);
        cache.put_with_cost(key("a", 0), hunk("a", 0), 60);
        cache.put_with_cost(key("a", 0), hunk("a", 0), 30);
        let stats = cache.stats();
        assert_eq!(stats.total_bytes, 30);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.eviction_count, 0);
    }

    #[test]
    fn oversized_entry_is_refused() {
        let cache = cache(100, 10);
        cache.put_with_cost(key("a", 0), hunk("a", 0), 10);
        assert!(!cache.put_with_cost(key("a", 0), hunk("a", 0), 101));
        assert!(!cache.contains(&key("a", 0)));
        assert_eq!(cache.stats().total_bytes, 0);
    }

    #[test]
    fn remove_file_drops_staged_and_unstaged() {
        let cache = cache(1_000, 10);
        cache.put_with_cost(CacheKey::new("a", false, 0), hunk("a", 0), 10);
        cache.put_with_cost(CacheKey::new("a", true, 0), hunk("a", 0), 10);
        cache.put_with_cost(CacheKey::new("b", false, 0), hunk("b", 0), 10);
        assert_eq!(cache.remove_file("a"), 2);
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_bytes, 10);
    }

    #[test]
    fn clear_keeps_counters() {
        let cache = cache(1_000, 10);
        cache.put_with_cost(key("a", 0), hunk("a", 0), 10);
        cache.get(&key("a", 0));
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_bytes, 0);
        assert_eq!(stats.hit_count, 1);
    }

    #[test]
    fn limits_hold_after_every_put() {
        // Deterministic pseudo-random costs and keys
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };
        let cache = cache(5_000, 40);
        for _ in 0..2_000 {
            let index = (next() % 120) as usize;
            let cost = (next() % 700) as usize + 1;
            let staged = next() % 2 == 0;
            cache.put_with_cost(CacheKey::new("f", staged, index), hunk("f", index), cost);
            if next() % 3 == 0 {
                cache.get(&CacheKey::new("f", !staged, index));
            }
            let stats = cache.stats();
            assert!(stats.total_bytes <= 5_000);
            assert!(stats.entries <= 40);
        }
    }

    #[test]
    fn concurrent_readers_and_writers_keep_totals_consistent() {
        let cache = Arc::new(cache(2_000, 50));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let k = CacheKey::new(format!("file{t}"), false, i % 30);
                        if i % 2 == 0 {
                            cache.put_with_cost(k, hunk("x", i), 37 + t * 11);
                        } else {
                            cache.get(&k);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert!(stats.total_bytes <= 2_000);
        assert!(stats.entries <= 50);
        assert_eq!(stats.hit_count + stats.miss_count, 4 * 250);
    }
}
