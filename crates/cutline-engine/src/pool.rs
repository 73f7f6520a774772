//! Decoder Pool: one decoder per source file.
//!
//! Decoders are opened lazily on the first request for a file. When the pool
//! reaches its capacity the least-recently-used decoder is dropped, which
//! closes its source.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use cutline_core::{Result, SourceId};
use cutline_media::{Decoder, DecoderState, SourceOpener};
use serde::Serialize;
use tracing::{debug, info};

/// Statistics about the current state of the pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Number of open decoders.
    pub active: usize,
    /// Hard maximum number of decoders the pool keeps open.
    pub max: usize,
    /// Decoders opened since creation.
    pub opened: u64,
    /// Decoders closed by eviction.
    pub evicted: u64,
    /// Total seeks across open decoders.
    pub seeks: u64,
    /// Total frames read across open decoders.
    pub frames_read: u64,
}

/// A single slot in the decoder pool.
struct DecoderSlot {
    decoder: Decoder,
    /// Monotonic timestamp of the last time this slot was accessed.
    last_used: Instant,
}

/// Bounded per-file decoder map.
pub struct DecoderPool {
    opener: Arc<dyn SourceOpener>,
    active: HashMap<SourceId, DecoderSlot>,
    max_decoders: usize,
    forward_threshold_ms: i64,
    max_seek_attempts: u32,
    opened: u64,
    evicted: u64,
}

impl DecoderPool {
    pub fn new(
        opener: Arc<dyn SourceOpener>,
        max_decoders: usize,
        forward_threshold_ms: i64,
        max_seek_attempts: u32,
    ) -> Self {
        Self {
            opener,
            active: HashMap::new(),
            max_decoders: max_decoders.max(1),
            forward_threshold_ms,
            max_seek_attempts,
            opened: 0,
            evicted: 0,
        }
    }

    /// Get the decoder for `source`, opening it if needed.
    pub fn get_or_open(&mut self, source: &SourceId) -> Result<&mut Decoder> {
        if !self.active.contains_key(source) {
            let decoder = Decoder::open(
                self.opener.as_ref(),
                source,
                self.forward_threshold_ms,
                self.max_seek_attempts,
            )?;
            if self.active.len() >= self.max_decoders {
                self.evict_lru();
            }
            info!(
                source = %source,
                width = decoder.info().width,
                height = decoder.info().height,
                fps = %decoder.frame_rate(),
                "decoder opened"
            );
            self.opened += 1;
            self.active.insert(
                source.clone(),
                DecoderSlot {
                    decoder,
                    last_used: Instant::now(),
                },
            );
        }

        match self.active.get_mut(source) {
            Some(slot) => {
                slot.last_used = Instant::now();
                Ok(&mut slot.decoder)
            }
            None => Err(cutline_core::CutlineError::Internal(format!(
                "decoder for {} missing after open",
                source
            ))),
        }
    }

    pub fn get(&self, source: &SourceId) -> Option<&Decoder> {
        self.active.get(source).map(|slot| &slot.decoder)
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.active.contains_key(source)
    }

    /// Threshold used for existing and future decoders.
    pub fn set_forward_threshold_all(&mut self, threshold_ms: i64) {
        self.forward_threshold_ms = threshold_ms;
        for slot in self.active.values_mut() {
            slot.decoder.set_forward_threshold(threshold_ms);
        }
    }

    /// Drop decoders stuck in the error state. Returns how many went.
    pub fn evict_failed(&mut self) -> usize {
        let before = self.active.len();
        self.active.retain(|source, slot| {
            let keep = slot.decoder.state() != DecoderState::Error;
            if !keep {
                debug!(source = %source, "dropping failed decoder");
            }
            keep
        });
        let removed = before - self.active.len();
        self.evicted += removed as u64;
        removed
    }

    /// Drop decoders idle longer than `max_idle_secs`.
    pub fn evict_idle(&mut self, max_idle_secs: f64) -> usize {
        let now = Instant::now();
        let before = self.active.len();
        self.active
            .retain(|_id, slot| now.duration_since(slot.last_used).as_secs_f64() < max_idle_secs);
        let removed = before - self.active.len();
        self.evicted += removed as u64;
        removed
    }

    /// Close every decoder.
    pub fn clear(&mut self) {
        self.active.clear();
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn stats(&self) -> PoolStats {
        let (seeks, frames_read) = self.active.values().fold((0, 0), |(s, f), slot| {
            let stats = slot.decoder.stats();
            (s + stats.seeks, f + stats.frames_read)
        });
        PoolStats {
            active: self.active.len(),
            max: self.max_decoders,
            opened: self.opened,
            evicted: self.evicted,
            seeks,
            frames_read,
        }
    }

    // ── internal helpers ──────────────────────────────────────────

    /// Evict the single least-recently-used slot.
    fn evict_lru(&mut self) {
        if let Some(lru_id) = self
            .active
            .iter()
            .min_by_key(|(_id, slot)| slot.last_used)
            .map(|(id, _)| id.clone())
        {
            debug!(source = %lru_id, "evicting least recently used decoder");
            self.active.remove(&lru_id);
            self.evicted += 1;
        }
    }
}

impl std::fmt::Debug for DecoderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderPool")
            .field("active", &self.active.len())
            .field("max_decoders", &self.max_decoders)
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
