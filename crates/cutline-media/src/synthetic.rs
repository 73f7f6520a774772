//! Deterministic synthetic sources.
//!
//! Each frame is a shifted color-bar pattern whose first pixel carries the
//! frame index, so tests can tell exactly which frame a render produced.
//! Sources behave like a real GOP-structured stream: seeks land on the
//! keyframe at or before the target and reads are strictly sequential.

use cutline_core::frame::rgba_size;
use cutline_core::{CutlineError, Frame, FrameRate, Result, SourceId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::source::{FrameSource, SourceError, SourceFrame, SourceOpener, StreamInfo};

/// Shape and fault injection for a synthetic stream.
#[derive(Debug, Clone)]
pub struct SyntheticSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub duration_ms: i64,
    /// Frames between keyframes.
    pub keyframe_interval: u32,
    /// Simulated decode cost per frame.
    pub read_delay: Duration,
    /// Frame indices whose read fails.
    pub corrupt_frames: HashSet<i64>,
    /// Opening this source fails.
    pub missing: bool,
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        Self {
            width: 64,
            height: 36,
            frame_rate: FrameRate::FPS_30,
            duration_ms: 10_000,
            keyframe_interval: 30,
            read_delay: Duration::ZERO,
            corrupt_frames: HashSet::new(),
            missing: false,
        }
    }
}

impl SyntheticSpec {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: FrameRate) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_keyframe_interval(mut self, interval: u32) -> Self {
        self.keyframe_interval = interval.max(1);
        self
    }

    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    pub fn with_corrupt_frame(mut self, index: i64) -> Self {
        self.corrupt_frames.insert(index);
        self
    }

    pub fn missing(mut self) -> Self {
        self.missing = true;
        self
    }

    pub fn frame_count(&self) -> i64 {
        self.frame_rate.frame_count(self.duration_ms)
    }

    fn info(&self) -> StreamInfo {
        StreamInfo {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            duration_ms: self.duration_ms,
        }
    }
}

/// Shared instrumentation for every source opened on one path.
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub opens: AtomicU64,
    pub seeks: AtomicU64,
    pub failed_seeks: AtomicU64,
    pub frames_read: AtomicU64,
    pending_seek_failures: AtomicU32,
}

impl SourceCounters {
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn seeks(&self) -> u64 {
        self.seeks.load(Ordering::Relaxed)
    }

    pub fn failed_seeks(&self) -> u64 {
        self.failed_seeks.load(Ordering::Relaxed)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read.load(Ordering::Relaxed)
    }

    /// Make the next `count` seeks on this path fail.
    pub fn fail_next_seeks(&self, count: u32) {
        self.pending_seek_failures.store(count, Ordering::Relaxed);
    }

    fn take_seek_failure(&self) -> bool {
        self.pending_seek_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Recover the frame index stamped into a synthetic frame.
pub fn frame_index_of(frame: &Frame) -> Option<i64> {
    let [lo, mid, hi, _] = frame.pixel(0, 0)?;
    Some(i64::from(lo) | i64::from(mid) << 8 | i64::from(hi) << 16)
}

/// A synthetic color-bar stream.
pub struct SyntheticSource {
    spec: SyntheticSpec,
    info: StreamInfo,
    /// Index of the next frame `read_frame` returns.
    position: i64,
    counters: Arc<SourceCounters>,
}

impl SyntheticSource {
    pub fn new(spec: SyntheticSpec, counters: Arc<SourceCounters>) -> Self {
        counters.opens.fetch_add(1, Ordering::Relaxed);
        Self {
            info: spec.info(),
            spec,
            position: 0,
            counters,
        }
    }

    fn render_frame(&self, index: i64) -> Vec<u8> {
        let phase = (index as u32).wrapping_mul(2);
        let mut rgba = Frame::test_pattern(self.spec.width, self.spec.height, phase, 0)
            .data
            .to_vec();
        if rgba.len() >= 4 && rgba.len() == rgba_size(self.spec.width, self.spec.height) {
            rgba[0] = (index & 0xff) as u8;
            rgba[1] = ((index >> 8) & 0xff) as u8;
            rgba[2] = ((index >> 16) & 0xff) as u8;
            rgba[3] = 255;
        }
        rgba
    }
}

impl FrameSource for SyntheticSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn seek(&mut self, target_ms: i64) -> std::result::Result<(), SourceError> {
        self.counters.seeks.fetch_add(1, Ordering::Relaxed);
        if self.counters.take_seek_failure() {
            self.counters.failed_seeks.fetch_add(1, Ordering::Relaxed);
            return Err(SourceError::SeekFailed(format!(
                "injected failure seeking to {} ms",
                target_ms
            )));
        }

        let last = (self.spec.frame_count() - 1).max(0);
        let target = self.spec.frame_rate.nearest_frame(target_ms).clamp(0, last);
        let interval = i64::from(self.spec.keyframe_interval.max(1));
        self.position = target / interval * interval;
        trace!(target_ms, keyframe = self.position, "synthetic seek");
        Ok(())
    }

    fn read_frame(&mut self) -> std::result::Result<Option<SourceFrame>, SourceError> {
        if self.position >= self.spec.frame_count() {
            return Ok(None);
        }
        if !self.spec.read_delay.is_zero() {
            std::thread::sleep(self.spec.read_delay);
        }

        let index = self.position;
        self.position += 1;
        self.counters.frames_read.fetch_add(1, Ordering::Relaxed);

        if self.spec.corrupt_frames.contains(&index) {
            return Err(SourceError::Corrupt(format!("frame {} is damaged", index)));
        }

        Ok(Some(SourceFrame {
            pts_ms: self.spec.frame_rate.frame_to_ms(index),
            width: self.spec.width,
            height: self.spec.height,
            rgba: self.render_frame(index),
        }))
    }
}

/// Opens synthetic sources, with optional per-path specs.
#[derive(Default)]
pub struct SyntheticOpener {
    default_spec: SyntheticSpec,
    specs: HashMap<SourceId, SyntheticSpec>,
    counters: Mutex<HashMap<SourceId, Arc<SourceCounters>>>,
}

impl SyntheticOpener {
    pub fn new(default_spec: SyntheticSpec) -> Self {
        Self {
            default_spec,
            ..Self::default()
        }
    }

    /// Use `spec` for `source` instead of the default.
    pub fn with_source(mut self, source: impl Into<SourceId>, spec: SyntheticSpec) -> Self {
        self.specs.insert(source.into(), spec);
        self
    }

    /// Counters shared by every source opened for `source`.
    pub fn counters(&self, source: &SourceId) -> Arc<SourceCounters> {
        self.counters
            .lock()
            .entry(source.clone())
            .or_default()
            .clone()
    }

    pub fn spec(&self, source: &SourceId) -> &SyntheticSpec {
        self.specs.get(source).unwrap_or(&self.default_spec)
    }
}

impl SourceOpener for SyntheticOpener {
    fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>> {
        let spec = self.spec(source).clone();
        if spec.missing {
            return Err(CutlineError::NotFound(format!("File not found: {}", source)));
        }
        let counters = self.counters(source);
        Ok(Box::new(SyntheticSource::new(spec, counters)))
    }
}
