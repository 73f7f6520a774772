//! Cutline Media - frame sources and the per-source decoder
//!
//! This crate handles:
//! - The seam to the decoding library (`FrameSource`, `SourceOpener`)
//! - FFmpeg-backed sources via ffmpeg-sidecar, and ffprobe metadata
//! - Deterministic synthetic sources for tests and demos
//! - The `Decoder` forward-or-seek state machine
//! - One-shot thumbnails

pub mod decoder;
pub mod ffmpeg;
pub mod probe;
pub mod source;
pub mod synthetic;
pub mod thumbnail;

pub use decoder::{DecodeOutcome, DecodePath, Decoder, DecoderState, DecoderStats};
pub use ffmpeg::{FfmpegOpener, FfmpegSource};
pub use probe::MediaProbe;
pub use source::{FrameSource, SourceError, SourceFrame, SourceOpener, StreamInfo};
pub use synthetic::{SourceCounters, SyntheticOpener, SyntheticSource, SyntheticSpec};
pub use thumbnail::{generate_thumbnail, thumbnail_strip};

use cutline_core::{Backend, EngineConfig};
use std::sync::Arc;

/// Build the opener selected by the engine config.
pub fn opener_for(config: &EngineConfig) -> Arc<dyn SourceOpener> {
    match config.backend {
        Backend::Ffmpeg => Arc::new(FfmpegOpener::new()),
        Backend::Synthetic => Arc::new(SyntheticOpener::default()),
    }
}
