//! Cutline Engine - frame cache, render orchestration and playback
//!
//! This crate owns everything behind the render call:
//! - `FrameCache`: byte- and count-budgeted LRU of decoded frames
//! - `DecoderPool`: one decoder per open source
//! - `RenderOrchestrator`: try-lock render path that always yields a frame or "skipped"
//! - `Prefetcher`: decode-ahead worker
//! - `PlaybackDriver` / `ScrubDriver`: clock and scrub threads

pub mod cache;
pub mod orchestrator;
pub mod playback;
pub mod pool;
pub mod prefetch;
pub mod stats;

pub use cache::{CacheKey, CacheStats, FrameCache};
pub use orchestrator::{EngineStats, FrameOrigin, RenderOrchestrator, RenderOutcome, RenderedFrame};
pub use playback::{
    FrameSink, PlaybackControl, PlaybackDriver, PlaybackSnapshot, ScrubDriver, ScrubStats,
};
pub use pool::{DecoderPool, PoolStats};
pub use prefetch::{PrefetchCommand, PrefetchStats, PrefetchStep, PrefetchTarget, Prefetcher};
pub use stats::{RenderStats, RenderStatsSnapshot};
