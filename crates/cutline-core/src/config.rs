//! Engine configuration.
//!
//! Every section falls back to its defaults, so `{}` is a complete config.

use crate::error::{CutlineError, Result};
use crate::memory_budget;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which media backend opens sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// FFmpeg subprocess via ffmpeg-sidecar
    #[default]
    Ffmpeg,
    /// Deterministic color-bar streams, no external tools
    Synthetic,
}

/// Frame cache budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: memory_budget::FRAME_CACHE_ENTRIES,
            max_bytes: memory_budget::FRAME_CACHE_BYTES,
        }
    }
}

/// Decoder seek policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Forward-decode tolerance while playing.
    pub playback_forward_threshold_ms: i64,
    /// Forward-decode tolerance while scrubbing.
    pub scrub_forward_threshold_ms: i64,
    /// Consecutive failed seeks before the decoder enters its error state.
    pub max_seek_attempts: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            playback_forward_threshold_ms: 5_000,
            scrub_forward_threshold_ms: 100,
            max_seek_attempts: 2,
        }
    }
}

impl DecoderConfig {
    /// Threshold for the given mode.
    pub fn forward_threshold_ms(&self, playing: bool) -> i64 {
        if playing {
            self.playback_forward_threshold_ms
        } else {
            self.scrub_forward_threshold_ms
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_decoders: usize,
    /// Decoders unused for this long are closed when playback pauses.
    pub idle_timeout_secs: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_decoders: memory_budget::MAX_OPEN_DECODERS,
            idle_timeout_secs: memory_budget::DECODER_IDLE_SECS,
        }
    }
}

/// Decode-ahead worker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub frames_ahead: usize,
    pub queue_capacity: usize,
    /// Attempts per frame when the render lock is busy.
    pub contention_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frames_ahead: memory_budget::LOOKAHEAD_FRAMES,
            queue_capacity: 64,
            contention_retries: 4,
            retry_backoff_ms: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub tick_interval_ms: u64,
    pub scrub_retry_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 33,
            scrub_retry_ms: 2,
        }
    }
}

/// Size of the blank frame returned when nothing else can be shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub blank_width: u32,
    pub blank_height: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            blank_width: memory_budget::PREVIEW_WIDTH,
            blank_height: memory_budget::PREVIEW_HEIGHT,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub decoder: DecoderConfig,
    pub pool: PoolConfig,
    pub prefetch: PrefetchConfig,
    pub playback: PlaybackConfig,
    pub output: OutputConfig,
    pub backend: Backend,
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CutlineError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 || self.cache.max_bytes == 0 {
            return Err(CutlineError::Config(
                "cache budgets must be non-zero".into(),
            ));
        }
        if self.decoder.max_seek_attempts == 0 {
            return Err(CutlineError::Config(
                "decoder.max_seek_attempts must be at least 1".into(),
            ));
        }
        // The immediate window is two frames; anything smaller than a frame
        // at 24 fps would force a seek on every sequential request.
        let min_threshold = 42;
        for (name, value) in [
            (
                "playback_forward_threshold_ms",
                self.decoder.playback_forward_threshold_ms,
            ),
            (
                "scrub_forward_threshold_ms",
                self.decoder.scrub_forward_threshold_ms,
            ),
        ] {
            if value < min_threshold {
                return Err(CutlineError::Config(format!(
                    "decoder.{} must be at least {} ms, got {}",
                    name, min_threshold, value
                )));
            }
        }
        if self.pool.max_decoders == 0 {
            return Err(CutlineError::Config("pool.max_decoders must be non-zero".into()));
        }
        if !(self.pool.idle_timeout_secs.is_finite() && self.pool.idle_timeout_secs > 0.0) {
            return Err(CutlineError::Config(format!(
                "pool.idle_timeout_secs must be positive, got {}",
                self.pool.idle_timeout_secs
            )));
        }
        if self.prefetch.enabled && self.prefetch.queue_capacity == 0 {
            return Err(CutlineError::Config(
                "prefetch.queue_capacity must be non-zero when prefetch is enabled".into(),
            ));
        }
        if self.playback.tick_interval_ms == 0 {
            return Err(CutlineError::Config(
                "playback.tick_interval_ms must be non-zero".into(),
            ));
        }
        if self.output.blank_width == 0 || self.output.blank_height == 0 {
            return Err(CutlineError::Config("blank frame size must be non-zero".into()));
        }
        Ok(())
    }
}
