//! RGBA frame buffers and media source identity.
//!
//! Frames are tightly packed RGBA8 with no row padding, so the byte size of a
//! frame is always `width * height * 4`. Pixel storage is shared: cloning a
//! frame (cache hit, fallback, hand-off to the display surface) never copies.

use crate::error::{CutlineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Identity of a media file, built from its path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(Arc<str>);

impl SourceId {
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    /// The file path this source was opened from.
    pub fn path(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for SourceId {
    fn from(path: String) -> Self {
        Self(Arc::from(path))
    }
}

/// A decoded video frame in RGBA8.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Packed RGBA8 pixels, row-major
    pub data: Arc<[u8]>,
    /// Presentation time in milliseconds (source PTS, or timeline time once rendered)
    pub timestamp_ms: i64,
}

impl Frame {
    /// Wrap packed RGBA8 pixels.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>, timestamp_ms: i64) -> Result<Self> {
        let expected = rgba_size(width, height);
        if data.len() != expected {
            return Err(CutlineError::InvalidParameter(format!(
                "RGBA buffer for {}x{} must be {} bytes, got {}",
                width,
                height,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data: data.into(),
            timestamp_ms,
        })
    }

    /// A fully transparent black frame.
    pub fn blank(width: u32, height: u32, timestamp_ms: i64) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; rgba_size(width, height)].into(),
            timestamp_ms,
        }
    }

    /// Color bars shifted horizontally by `phase` columns.
    pub fn test_pattern(width: u32, height: u32, phase: u32, timestamp_ms: i64) -> Self {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255], // White
            [255, 255, 0, 255],   // Yellow
            [0, 255, 255, 255],   // Cyan
            [0, 255, 0, 255],     // Green
            [255, 0, 255, 255],   // Magenta
            [255, 0, 0, 255],     // Red
            [0, 0, 255, 255],     // Blue
            [0, 0, 0, 255],       // Black
        ];

        let row_bytes = width as usize * BYTES_PER_PIXEL;
        let mut row = vec![0u8; row_bytes];
        for x in 0..width {
            let shifted = (x + phase) % width.max(1);
            let bar = (shifted as u64 * 8 / width.max(1) as u64) as usize;
            let i = x as usize * BYTES_PER_PIXEL;
            row[i..i + BYTES_PER_PIXEL].copy_from_slice(&BARS[bar.min(7)]);
        }

        let mut data = Vec::with_capacity(rgba_size(width, height));
        for _ in 0..height {
            data.extend_from_slice(&row);
        }

        Self {
            width,
            height,
            data: data.into(),
            timestamp_ms,
        }
    }

    /// Exact pixel-buffer size in bytes.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Same pixels, new presentation time.
    pub fn restamped(&self, timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            ..self.clone()
        }
    }

    /// RGBA value at (x, y), if inside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(i..i + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Whether every byte is zero.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    /// Whether two frames share the same pixel allocation.
    pub fn shares_pixels(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .field("timestamp_ms", &self.timestamp_ms)
            .finish()
    }
}

/// Byte size of a packed RGBA8 frame.
#[inline]
pub fn rgba_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * BYTES_PER_PIXEL
}
