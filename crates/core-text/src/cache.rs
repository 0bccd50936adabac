//! Bounded LRU cache for measured string widths.
//!
//! Measurement is pure, so caching is by input identity only. Two bounds keep
//! the cache predictable under hostile input:
//! * entry capacity (default 10 000) with LRU eviction;
//! * a key-length cap (default 96 UTF-16 code units) above which inputs are
//!   measured but never cached.
//!
//! A policy change (emoji narrow <-> wide) changes every cached answer, so it
//! invalidates the whole cache.

use crate::width::{EmojiWidthPolicy, measure_cells};
use ahash::AHashMap;
use std::collections::VecDeque;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_MAX_KEY_UNITS: usize = 96;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    width: usize,
    tick: u64,
}

#[derive(Debug)]
pub struct WidthCache {
    policy: EmojiWidthPolicy,
    map: AHashMap<Box<str>, CacheEntry>,
    /// Recency queue of (tick, key). Entries whose tick no longer matches the
    /// map are stale and skipped during eviction.
    queue: VecDeque<(u64, Box<str>)>,
    tick: u64,
    capacity: usize,
    max_key_units: usize,
    pub hits: u64,
    pub misses: u64,
}

impl WidthCache {
    pub fn new(policy: EmojiWidthPolicy) -> Self {
        Self::with_limits(policy, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_KEY_UNITS)
    }

    pub fn with_limits(policy: EmojiWidthPolicy, capacity: usize, max_key_units: usize) -> Self {
        Self {
            policy,
            map: AHashMap::with_capacity(capacity.min(1024)),
            queue: VecDeque::new(),
            tick: 0,
            capacity: capacity.max(1),
            max_key_units,
            hits: 0,
            misses: 0,
        }
    }

    pub fn policy(&self) -> EmojiWidthPolicy {
        self.policy
    }

    /// Switch policy, invalidating every cached width when it changes.
    pub fn set_policy(&mut self, policy: EmojiWidthPolicy) {
        if policy != self.policy {
            self.policy = policy;
            self.map.clear();
            self.queue.clear();
            tracing::debug!(target: "text.cache", ?policy, "width cache invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Measure through the cache.
    pub fn measure(&mut self, text: &str) -> usize {
        // Oversized keys bypass the cache entirely.
        if utf16_units_exceed(text, self.max_key_units) {
            return measure_cells(text, self.policy);
        }
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.map.get_mut(text) {
            entry.tick = tick;
            self.queue.push_back((tick, Box::from(text)));
            self.hits += 1;
            return entry.width;
        }
        self.misses += 1;
        let width = measure_cells(text, self.policy);
        if self.map.len() >= self.capacity {
            self.evict_lru();
        }
        self.map.insert(Box::from(text), CacheEntry { width, tick });
        self.queue.push_back((tick, Box::from(text)));
        width
    }

    fn evict_lru(&mut self) {
        while let Some((tick, key)) = self.queue.pop_front() {
            // Stale queue entries carry a tick older than the live one.
            let live = match self.map.get(&key) {
                Some(entry) => entry.tick,
                None => continue,
            };
            if live == tick {
                self.map.remove(&key);
                return;
            }
        }
    }
}

/// True when `text` is longer than `limit` UTF-16 code units, without
/// counting the whole string.
fn utf16_units_exceed(text: &str, limit: usize) -> bool {
    let mut units = 0usize;
    for c in text.chars() {
        units += c.len_utf16();
        if units > limit {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_same_width() {
        let mut cache = WidthCache::new(EmojiWidthPolicy::Wide);
        let a = cache.measure("漢字");
        let b = cache.measure("漢字");
        assert_eq!(a, 4);
        assert_eq!(b, 4);
        assert_eq!(cache.hits, 1);
        assert_eq!(cache.misses, 1);
    }

    #[test]
    fn capacity_evicts_lru() {
        let mut cache = WidthCache::with_limits(EmojiWidthPolicy::Wide, 2, 96);
        cache.measure("aa");
        cache.measure("bb");
        cache.measure("aa"); // refresh "aa"; "bb" is now LRU
        cache.measure("cc"); // evicts "bb"
        assert_eq!(cache.len(), 2);
        let misses_before = cache.misses;
        cache.measure("aa");
        assert_eq!(cache.misses, misses_before, "aa should still be cached");
        cache.measure("bb");
        assert_eq!(cache.misses, misses_before + 1, "bb was evicted");
    }

    #[test]
    fn oversized_keys_are_not_cached() {
        let mut cache = WidthCache::with_limits(EmojiWidthPolicy::Wide, 8, 4);
        let long = "abcdefgh";
        assert_eq!(cache.measure(long), 8);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn policy_change_invalidates() {
        let mut cache = WidthCache::new(EmojiWidthPolicy::Wide);
        assert_eq!(cache.measure("😀"), 2);
        cache.set_policy(EmojiWidthPolicy::Narrow);
        assert!(cache.is_empty());
        assert_eq!(cache.measure("😀"), 1);
    }

    #[test]
    fn same_policy_set_keeps_entries() {
        let mut cache = WidthCache::new(EmojiWidthPolicy::Wide);
        cache.measure("abc");
        cache.set_policy(EmojiWidthPolicy::Wide);
        assert_eq!(cache.len(), 1);
    }
}
