//! The seam between the decoder and the decoding library.

use cutline_core::{CutlineError, FrameRate, Result, SourceId};
use thiserror::Error;

/// Stream-level failures reported by a frame source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("corrupt frame: {0}")]
    Corrupt(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("seek failed: {0}")]
    SeekFailed(String),

    #[error("decoder process error: {0}")]
    Process(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SourceError> for CutlineError {
    fn from(err: SourceError) -> Self {
        CutlineError::Decoder(err.to_string())
    }
}

/// Video stream parameters of an opened source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub duration_ms: i64,
}

/// One decoded picture straight from the source, RGBA8.
#[derive(Debug, Clone)]
pub struct SourceFrame {
    pub pts_ms: i64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// A compressed stream that can be repositioned and read sequentially.
pub trait FrameSource: Send {
    fn info(&self) -> &StreamInfo;

    /// Flush buffered state and reposition at or before `target_ms`.
    fn seek(&mut self, target_ms: i64) -> std::result::Result<(), SourceError>;

    /// Next frame in presentation order, `Ok(None)` at end of stream.
    fn read_frame(&mut self) -> std::result::Result<Option<SourceFrame>, SourceError>;
}

/// Opens frame sources by file identity.
pub trait SourceOpener: Send + Sync {
    fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>>;
}
