//! Render diagnostics.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::cache::CacheStats;
use crate::pool::PoolStats;

/// Lock-free render counters, shared by every caller of `render`.
#[derive(Debug, Default)]
pub struct RenderStats {
    total: AtomicU64,
    cache_hits: AtomicU64,
    decoded: AtomicU64,
    end_of_stream: AtomicU64,
    fallbacks: AtomicU64,
    blanks: AtomicU64,
    contended: AtomicU64,
    open_failures: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

/// Point-in-time copy of `RenderStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStatsSnapshot {
    pub total: u64,
    pub cache_hits: u64,
    pub decoded: u64,
    pub end_of_stream: u64,
    pub fallbacks: u64,
    pub blanks: u64,
    pub contended: u64,
    pub open_failures: u64,
    /// Most critical sections ever observed running at once.
    pub max_in_flight: u64,
}

/// Marks one critical section as running until dropped.
pub struct InFlightGuard<'a> {
    stats: &'a RenderStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl RenderStats {
    /// Count a render call. Returns the new total.
    pub(crate) fn record_call(&self) -> u64 {
        self.total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_decode(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_end_of_stream(&self) {
        self.end_of_stream.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_blank(&self) {
        self.blanks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contention(&self) {
        self.contended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open_failure(&self) {
        self.open_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Enter a critical section.
    pub(crate) fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlightGuard { stats: self }
    }

    pub fn snapshot(&self) -> RenderStatsSnapshot {
        RenderStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            end_of_stream: self.end_of_stream.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            blanks: self.blanks.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            max_in_flight: self.max_in_flight.load(Ordering::Acquire),
        }
    }
}

/// Cache and pool counters copied out of the engine lock at the end of each
/// critical section. Fields are stored one by one, so a reader racing a
/// publish may see a mix of two consecutive snapshots.
#[derive(Debug, Default)]
pub struct PublishedStats {
    frame_count: AtomicUsize,
    total_bytes: AtomicUsize,
    max_entries: AtomicUsize,
    max_bytes: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    active_decoders: AtomicUsize,
    max_decoders: AtomicUsize,
    opened: AtomicU64,
    evicted: AtomicU64,
    seeks: AtomicU64,
    frames_read: AtomicU64,
}

impl PublishedStats {
    pub(crate) fn publish(&self, cache: &CacheStats, pool: &PoolStats) {
        self.frame_count.store(cache.frame_count, Ordering::Relaxed);
        self.total_bytes.store(cache.total_bytes, Ordering::Relaxed);
        self.max_entries.store(cache.max_entries, Ordering::Relaxed);
        self.max_bytes.store(cache.max_bytes, Ordering::Relaxed);
        self.hits.store(cache.hits, Ordering::Relaxed);
        self.misses.store(cache.misses, Ordering::Relaxed);
        self.evictions.store(cache.evictions, Ordering::Relaxed);
        self.active_decoders.store(pool.active, Ordering::Relaxed);
        self.max_decoders.store(pool.max, Ordering::Relaxed);
        self.opened.store(pool.opened, Ordering::Relaxed);
        self.evicted.store(pool.evicted, Ordering::Relaxed);
        self.seeks.store(pool.seeks, Ordering::Relaxed);
        self.frames_read.store(pool.frames_read, Ordering::Release);
    }

    pub fn cache(&self) -> CacheStats {
        CacheStats {
            frame_count: self.frame_count.load(Ordering::Acquire),
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            max_entries: self.max_entries.load(Ordering::Relaxed),
            max_bytes: self.max_bytes.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn pool(&self) -> PoolStats {
        PoolStats {
            active: self.active_decoders.load(Ordering::Acquire),
            max: self.max_decoders.load(Ordering::Relaxed),
            opened: self.opened.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            seeks: self.seeks.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
        }
    }
}
