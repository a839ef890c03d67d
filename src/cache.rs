//! Page-break map cache
//!
//! Maps are keyed by chapter index and a fingerprint of the settings they
//! were computed with. Entries expire after a fixed age and the least
//! recently used entry is evicted once the cache is full. Cached maps are
//! shared behind [`Arc`] and never mutated; updates replace them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::model::PageBreakMap;
use crate::settings::SettingsFingerprint;

/// Identity of a cached map
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Chapter the map belongs to
    pub chapter_index: usize,
    /// Fingerprint of the settings it was computed with
    pub settings: SettingsFingerprint,
}

impl CacheKey {
    /// Build a key
    pub fn new(chapter_index: usize, settings: SettingsFingerprint) -> Self {
        Self {
            chapter_index,
            settings,
        }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    map: Arc<PageBreakMap>,
    content_crc: u32,
    created_at: Instant,
    last_accessed: Instant,
}

/// Running counters, mostly for diagnostics and tests
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing usable
    pub misses: u64,
    /// Entries dropped for age
    pub expired: u64,
    /// Entries dropped for capacity
    pub evicted: u64,
}

/// TTL and LRU bounded store of [`PageBreakMap`]s.
#[derive(Debug)]
pub struct PageBreakCache {
    entries: HashMap<CacheKey, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    stats: CacheStats,
}

/// Fingerprint of chapter markup, stored alongside each entry.
pub fn content_fingerprint(content: &str) -> u32 {
    crc32fast::hash(content.as_bytes())
}

impl PageBreakCache {
    /// Create an empty cache; a zero capacity is treated as one.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Fresh map for `key` computed from `content_crc`, if any.
    ///
    /// Stale entries and entries built from different content are removed.
    pub fn get(&mut self, key: &CacheKey, content_crc: u32, now: Instant) -> Option<Arc<PageBreakMap>> {
        let fresh = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => {
                !self.is_expired(entry, now) && entry.content_crc == content_crc
            }
        };
        if !fresh {
            self.entries.remove(key);
            self.stats.expired += 1;
            self.stats.misses += 1;
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        self.stats.hits += 1;
        Some(entry.map.clone())
    }

    /// Fresh map for `key` regardless of content.
    pub fn peek(&mut self, key: &CacheKey, now: Instant) -> Option<Arc<PageBreakMap>> {
        let entry = self.entries.get(key)?;
        if self.is_expired(entry, now) {
            self.entries.remove(key);
            self.stats.expired += 1;
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed = now;
        Some(entry.map.clone())
    }

    /// Store a map, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: CacheKey, map: Arc<PageBreakMap>, content_crc: u32, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired(now);
            if self.entries.len() >= self.capacity {
                if let Some(oldest) = self
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_accessed)
                    .map(|(key, _)| *key)
                {
                    log::trace!("evicting page map for chapter {}", oldest.chapter_index);
                    self.entries.remove(&oldest);
                    self.stats.evicted += 1;
                }
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                map,
                content_crc,
                created_at: now,
                last_accessed: now,
            },
        );
    }

    /// Swap the map stored under `key`, keeping its age and content fingerprint.
    ///
    /// Returns false when no entry exists.
    pub fn replace(&mut self, key: &CacheKey, map: Arc<PageBreakMap>) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.map = map;
                true
            }
            None => false,
        }
    }

    /// Drop one chapter's entries, or everything when `chapter_index` is `None`.
    pub fn invalidate(&mut self, chapter_index: Option<usize>) -> usize {
        let before = self.entries.len();
        match chapter_index {
            Some(idx) => self.entries.retain(|key, _| key.chapter_index != idx),
            None => self.entries.clear(),
        }
        before - self.entries.len()
    }

    /// Remove every entry older than the TTL.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.created_at) < ttl);
        let removed = before - self.entries.len();
        self.stats.expired += removed as u64;
        removed
    }

    /// Keys currently stored for settings `fingerprint`, by chapter
    pub fn keys_for_settings(&self, fingerprint: SettingsFingerprint) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries
            .keys()
            .filter(|key| key.settings == fingerprint)
            .copied()
            .collect();
        keys.sort_by_key(|key| key.chapter_index);
        keys
    }

    /// Entries stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counters since creation
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    fn is_expired(&self, entry: &CacheEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.created_at) >= self.ttl
    }
}
