//! Cutline Core - Foundation types for the decode/cache/playback engine
//!
//! This crate provides the fundamental types shared by every other crate:
//! - RGBA frames and source identity
//! - Frame rates and millisecond frame-grid math
//! - Engine configuration
//! - Error types

pub mod config;
pub mod error;
pub mod frame;
pub mod time;

pub use config::{
    Backend, CacheConfig, DecoderConfig, EngineConfig, OutputConfig, PlaybackConfig,
    PoolConfig, PrefetchConfig,
};
pub use error::{CutlineError, Result};
pub use frame::{Frame, SourceId};
pub use time::{FrameRate, MAX_TIME_MS};

/// Memory budget constants for the preview engine.
pub mod memory_budget {
    /// Default frame cache byte budget.
    pub const FRAME_CACHE_BYTES: usize = 200 * 1024 * 1024; // 200 MB

    /// Default frame cache entry budget (~2 s of 30 fps preview).
    pub const FRAME_CACHE_ENTRIES: usize = 60;

    /// Number of frames decoded ahead of the playhead.
    pub const LOOKAHEAD_FRAMES: usize = 5;

    /// Preview frame size used for blank frames (960x540 RGBA = ~2 MB).
    pub const PREVIEW_WIDTH: u32 = 960;
    pub const PREVIEW_HEIGHT: u32 = 540;

    /// Maximum decoders kept open at once.
    pub const MAX_OPEN_DECODERS: usize = 8;

    /// Seconds a decoder may sit unused before a pause closes it.
    pub const DECODER_IDLE_SECS: f64 = 30.0;
}
