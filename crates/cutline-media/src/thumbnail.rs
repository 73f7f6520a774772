//! One-shot thumbnail extraction.
//!
//! Thumbnails open their own source and never touch the render pool, so a
//! thumbnail request cannot disturb a decoder that playback is streaming from.

use cutline_core::{CutlineError, Frame, Result, SourceId};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use rayon::prelude::*;
use tracing::debug;

use crate::decoder::{DecodeOutcome, Decoder};
use crate::source::SourceOpener;

/// Output size for a `width` x `height` request. A zero dimension follows the
/// source aspect ratio; both zero keeps the source size.
pub fn fit_size(src_width: u32, src_height: u32, width: u32, height: u32) -> (u32, u32) {
    let scale = |value: u32, num: u32, den: u32| -> u32 {
        ((value as u64 * num as u64 + den as u64 / 2) / den.max(1) as u64).max(1) as u32
    };
    match (width, height) {
        (0, 0) => (src_width, src_height),
        (w, 0) => (w, scale(src_height, w, src_width)),
        (0, h) => (scale(src_width, h, src_height), h),
        (w, h) => (w, h),
    }
}

/// Resize an RGBA frame, keeping its timestamp.
pub fn resize_frame(frame: &Frame, width: u32, height: u32) -> Result<Frame> {
    let (width, height) = fit_size(frame.width, frame.height, width, height);
    if width == frame.width && height == frame.height {
        return Ok(frame.clone());
    }
    let image = RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
        .ok_or_else(|| {
            CutlineError::Internal(format!(
                "RGBA buffer does not match {}x{}",
                frame.width, frame.height
            ))
        })?;
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    Frame::from_rgba(width, height, resized.into_raw(), frame.timestamp_ms)
}

/// Decode the frame nearest `source_time_ms` from a fresh source and scale it.
pub fn generate_thumbnail(
    opener: &dyn SourceOpener,
    source: &SourceId,
    source_time_ms: i64,
    width: u32,
    height: u32,
) -> Result<Frame> {
    let mut decoder = Decoder::open(opener, source, 0, 2)?;
    let frame = match decoder.decode(source_time_ms.max(0)) {
        DecodeOutcome::Frame(frame) | DecodeOutcome::EndOfStream(frame) => frame,
        DecodeOutcome::FrameSkipped => {
            return Err(CutlineError::Decoder(
                decoder
                    .last_error()
                    .unwrap_or("frame could not be decoded")
                    .to_string(),
            ))
        }
        DecodeOutcome::EndOfStreamEmpty => {
            return Err(CutlineError::Media(format!("{} has no frames", source)))
        }
    };
    debug!(
        source = %source,
        time_ms = source_time_ms,
        pts_ms = frame.timestamp_ms,
        "thumbnail decoded"
    );
    resize_frame(&frame, width, height)
}

/// Generate thumbnails for several times in parallel.
pub fn thumbnail_strip(
    opener: &dyn SourceOpener,
    source: &SourceId,
    times_ms: &[i64],
    width: u32,
    height: u32,
) -> Vec<Result<Frame>> {
    times_ms
        .par_iter()
        .map(|&t| generate_thumbnail(opener, source, t, width, height))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{frame_index_of, SyntheticOpener, SyntheticSpec};

    #[test]
    fn test_fit_size() {
        assert_eq!(fit_size(1920, 1080, 0, 0), (1920, 1080));
        assert_eq!(fit_size(1920, 1080, 160, 0), (160, 90));
        assert_eq!(fit_size(1920, 1080, 0, 90), (160, 90));
        assert_eq!(fit_size(1920, 1080, 100, 100), (100, 100));
    }

    #[test]
    fn test_thumbnail_size_and_time() {
        let opener = SyntheticOpener::new(SyntheticSpec::default().with_size(320, 180));
        let id = SourceId::new("bars.mp4");
        let thumb = generate_thumbnail(&opener, &id, 1_000, 160, 0).unwrap();
        assert_eq!((thumb.width, thumb.height), (160, 90));
        assert_eq!(thumb.byte_size(), 160 * 90 * 4);
        assert_eq!(thumb.timestamp_ms, 1_000);
    }

    #[test]
    fn test_native_size_keeps_pixels() {
        let opener = SyntheticOpener::new(SyntheticSpec::default());
        let id = SourceId::new("bars.mp4");
        let thumb = generate_thumbnail(&opener, &id, 66, 0, 0).unwrap();
        assert_eq!(frame_index_of(&thumb), Some(2));
    }

    #[test]
    fn test_thumbnail_past_end_uses_last_frame() {
        let opener = SyntheticOpener::new(SyntheticSpec::default().with_duration_ms(1_000));
        let id = SourceId::new("short.mp4");
        let thumb = generate_thumbnail(&opener, &id, 60_000, 0, 0).unwrap();
        assert_eq!(frame_index_of(&thumb), Some(29));
    }

    #[test]
    fn test_missing_source() {
        let opener =
            SyntheticOpener::default().with_source("gone.mp4", SyntheticSpec::default().missing());
        let result = generate_thumbnail(&opener, &SourceId::new("gone.mp4"), 0, 64, 0);
        assert!(matches!(result, Err(CutlineError::NotFound(_))));
    }

    #[test]
    fn test_strip_in_parallel() {
        let opener = SyntheticOpener::new(SyntheticSpec::default());
        let id = SourceId::new("bars.mp4");
        let strip = thumbnail_strip(&opener, &id, &[0, 1_000, 2_000, 3_000], 32, 0);
        assert_eq!(strip.len(), 4);
        let stamps: Vec<i64> = strip
            .iter()
            .map(|t| t.as_ref().unwrap().timestamp_ms)
            .collect();
        assert_eq!(stamps, vec![0, 1_000, 2_000, 3_000]);
        assert_eq!(opener.counters(&id).opens(), 4);
    }
}
