//! Byte- and count-budgeted LRU frame cache.
//!
//! Entries are keyed by `(source, source_time_ms)`. The running byte total is
//! updated in the same step as the index on every insert, replace and
//! eviction, so `total_bytes` always equals the sum of the cached frame sizes.

use cutline_core::{Frame, SourceId};
use lru::LruCache;
use serde::Serialize;
use tracing::trace;

/// Cache key: source file and snapped source time.
pub type CacheKey = (SourceId, i64);

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of cached frames
    pub frame_count: usize,
    /// Sum of cached frame sizes
    pub total_bytes: usize,
    pub max_entries: usize,
    pub max_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// LRU frame cache with entry and byte budgets.
pub struct FrameCache {
    entries: LruCache<CacheKey, Frame>,
    max_entries: usize,
    max_bytes: usize,
    total_bytes: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl FrameCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            max_entries,
            max_bytes,
            total_bytes: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Look up a frame and mark it most recently used.
    pub fn get(&mut self, source: &SourceId, time_ms: i64) -> Option<Frame> {
        match self.entries.get(&(source.clone(), time_ms)) {
            Some(frame) => {
                self.hits += 1;
                Some(frame.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Check for a frame without touching recency or counters.
    pub fn contains(&self, source: &SourceId, time_ms: i64) -> bool {
        self.entries.contains(&(source.clone(), time_ms))
    }

    /// Insert or replace a frame, then evict LRU entries until both budgets
    /// hold. Returns false when the frame cannot be cached at all.
    pub fn put(&mut self, source: &SourceId, time_ms: i64, frame: Frame) -> bool {
        let size = frame.byte_size();
        if self.max_entries == 0 || size > self.max_bytes {
            trace!(source = %source, time_ms, size, "frame exceeds cache budget");
            return false;
        }

        if let Some(old) = self.entries.put((source.clone(), time_ms), frame) {
            self.total_bytes -= old.byte_size();
        }
        self.total_bytes += size;

        while self.entries.len() > self.max_entries || self.total_bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some(((evicted_source, evicted_time), evicted)) => {
                    self.total_bytes -= evicted.byte_size();
                    self.evictions += 1;
                    trace!(source = %evicted_source, time_ms = evicted_time, "evicted frame");
                }
                None => break,
            }
        }
        true
    }

    /// Drop every frame of one source.
    pub fn invalidate_source(&mut self, source: &SourceId) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|((s, _), _)| s == source)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            if let Some(frame) = self.entries.pop(key) {
                self.total_bytes -= frame.byte_size();
            }
        }
        keys.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            frame_count: self.entries.len(),
            total_bytes: self.total_bytes,
            max_entries: self.max_entries,
            max_bytes: self.max_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    /// Recompute the byte total from the entries.
    pub fn recount_bytes(&self) -> usize {
        self.entries.iter().map(|(_, frame)| frame.byte_size()).sum()
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("frames", &self.entries.len())
            .field("total_bytes", &self.total_bytes)
            .field("max_entries", &self.max_entries)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}
