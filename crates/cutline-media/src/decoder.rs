//! Per-source decoder that decides between forward decode and seek.
//!
//! A `Decoder` tracks where it is in a compressed stream. Each request is
//! classified against the previous one:
//!
//! - **Immediate**: the target is at most two frames ahead, read on.
//! - **Forward**: the target is ahead within the forward threshold, read on
//!   until the target frame is reached.
//! - **Seek**: first request, backward jump, far jump, or the decoder is not
//!   ready. Reposition to the keyframe before the target and read forward.
//!
//! `decode` never fails. Stream problems surface as `DecodeOutcome` variants
//! and the most recent error is kept in `last_error()`.

use cutline_core::{Frame, FrameRate, Result, SourceId};
use tracing::{debug, trace, warn};

use crate::source::{FrameSource, SourceError, SourceFrame, SourceOpener, StreamInfo};

/// Decoder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Positioned in the stream, sequential reads possible.
    Ready,
    /// The stream ran out. The next request seeks.
    EndOfStream,
    /// Seeking failed repeatedly. Only the last good frame is served.
    Error,
}

/// How a request will be serviced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    Immediate,
    Forward,
    Seek,
}

/// Result of one decode request.
#[derive(Debug, Clone)]
pub enum DecodeOutcome {
    /// A frame at or just past the target.
    Frame(Frame),
    /// A transient read failure. Nothing to show from this call.
    FrameSkipped,
    /// The stream ended before the target. Carries the last good frame.
    EndOfStream(Frame),
    /// The stream ended and no frame was ever produced.
    EndOfStreamEmpty,
}

impl DecodeOutcome {
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::Frame(frame) | Self::EndOfStream(frame) => Some(frame),
            Self::FrameSkipped | Self::EndOfStreamEmpty => None,
        }
    }
}

/// Decode counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub seeks: u64,
    pub failed_seeks: u64,
    pub immediate_decodes: u64,
    pub forward_decodes: u64,
    pub seek_decodes: u64,
    /// Requests answered by the previous frame without reading.
    pub reused: u64,
    pub frames_read: u64,
    pub read_errors: u64,
}

/// Decoder for one source.
pub struct Decoder {
    source_id: SourceId,
    source: Box<dyn FrameSource>,
    info: StreamInfo,
    state: DecoderState,
    last_timestamp_ms: Option<i64>,
    /// Set while the stream position is unknown after a failed seek.
    needs_seek: bool,
    forward_threshold_ms: i64,
    max_seek_attempts: u32,
    consecutive_seek_failures: u32,
    last_good: Option<Frame>,
    last_error: Option<String>,
    stats: DecoderStats,
}

impl Decoder {
    /// Wrap an opened source.
    pub fn new(
        source_id: SourceId,
        source: Box<dyn FrameSource>,
        forward_threshold_ms: i64,
        max_seek_attempts: u32,
    ) -> Self {
        let info = *source.info();
        Self {
            source_id,
            source,
            info,
            state: DecoderState::Ready,
            last_timestamp_ms: None,
            needs_seek: false,
            forward_threshold_ms,
            max_seek_attempts: max_seek_attempts.max(1),
            consecutive_seek_failures: 0,
            last_good: None,
            last_error: None,
            stats: DecoderStats::default(),
        }
    }

    /// Open `source_id` through `opener`.
    pub fn open(
        opener: &dyn SourceOpener,
        source_id: &SourceId,
        forward_threshold_ms: i64,
        max_seek_attempts: u32,
    ) -> Result<Self> {
        let source = opener.open(source_id)?;
        Ok(Self::new(
            source_id.clone(),
            source,
            forward_threshold_ms,
            max_seek_attempts,
        ))
    }

    pub fn source_id(&self) -> &SourceId {
        &self.source_id
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn frame_rate(&self) -> FrameRate {
        self.info.frame_rate
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn last_timestamp_ms(&self) -> Option<i64> {
        self.last_timestamp_ms
    }

    pub fn forward_threshold_ms(&self) -> i64 {
        self.forward_threshold_ms
    }

    pub fn set_forward_threshold(&mut self, threshold_ms: i64) {
        self.forward_threshold_ms = threshold_ms;
    }

    /// Description of the most recent stream failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_good(&self) -> Option<&Frame> {
        self.last_good.as_ref()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn half_frame_ms(&self) -> f64 {
        self.info.frame_rate.frame_duration_ms() / 2.0
    }

    /// Whether a frame at `pts_ms` answers a request for `target_ms`.
    fn satisfies(&self, pts_ms: i64, target_ms: i64) -> bool {
        pts_ms as f64 >= target_ms as f64 - self.half_frame_ms()
    }

    /// Classify a request without touching the stream.
    pub fn plan(&self, target_ms: i64) -> DecodePath {
        let last = match (self.state, self.last_timestamp_ms) {
            (DecoderState::Ready, Some(last)) if !self.needs_seek => last,
            _ => return DecodePath::Seek,
        };
        let gap = target_ms.saturating_sub(last);
        if gap < 0 {
            return DecodePath::Seek;
        }
        if gap as f64 <= 2.0 * self.info.frame_rate.frame_duration_ms() {
            DecodePath::Immediate
        } else if gap <= self.forward_threshold_ms {
            DecodePath::Forward
        } else {
            DecodePath::Seek
        }
    }

    /// Produce the frame for `target_ms`.
    pub fn decode(&mut self, target_ms: i64) -> DecodeOutcome {
        let path = self.plan(target_ms);
        let previous = self.last_timestamp_ms.replace(target_ms);

        if self.state == DecoderState::Error {
            return match &self.last_good {
                Some(frame) => DecodeOutcome::Frame(frame.clone()),
                None => DecodeOutcome::FrameSkipped,
            };
        }

        match path {
            DecodePath::Immediate | DecodePath::Forward => {
                if let Some(frame) = self.last_good.as_ref() {
                    if frame.timestamp_ms.abs_diff(target_ms) as f64 <= self.half_frame_ms() {
                        self.stats.reused += 1;
                        return DecodeOutcome::Frame(frame.clone());
                    }
                }
                if path == DecodePath::Immediate {
                    self.stats.immediate_decodes += 1;
                    self.read_until(target_ms, Some(2))
                } else {
                    self.stats.forward_decodes += 1;
                    trace!(
                        source = %self.source_id,
                        time_ms = target_ms,
                        gap_ms = previous.map(|p| target_ms.saturating_sub(p)),
                        "forward decode"
                    );
                    self.read_until(target_ms, None)
                }
            }
            DecodePath::Seek => {
                debug!(
                    source = %self.source_id,
                    time_ms = target_ms,
                    gap_ms = previous.map(|p| target_ms.saturating_sub(p)),
                    state = ?self.state,
                    "seeking"
                );
                self.stats.seek_decodes += 1;
                if self.seek_with_retry(target_ms).is_err() {
                    return match (&self.last_good, self.state) {
                        (Some(frame), DecoderState::Error) => DecodeOutcome::Frame(frame.clone()),
                        _ => DecodeOutcome::FrameSkipped,
                    };
                }
                self.read_until(target_ms, None)
            }
        }
    }

    /// Seek, retrying once within the same call.
    fn seek_with_retry(&mut self, target_ms: i64) -> std::result::Result<(), SourceError> {
        let attempts = self.max_seek_attempts.min(2);
        let mut result = self.seek(target_ms);
        let mut attempt = 1;
        while result.is_err() && attempt < attempts && self.state != DecoderState::Error {
            result = self.seek(target_ms);
            attempt += 1;
        }
        result
    }

    /// Reposition the stream at or before `target_ms`.
    pub fn seek(&mut self, target_ms: i64) -> std::result::Result<(), SourceError> {
        self.stats.seeks += 1;
        match self.source.seek(target_ms) {
            Ok(()) => {
                self.state = DecoderState::Ready;
                self.needs_seek = false;
                self.consecutive_seek_failures = 0;
                Ok(())
            }
            Err(e) => {
                self.stats.failed_seeks += 1;
                self.consecutive_seek_failures += 1;
                self.needs_seek = true;
                self.last_error = Some(e.to_string());
                if self.consecutive_seek_failures >= self.max_seek_attempts {
                    self.state = DecoderState::Error;
                    warn!(
                        source = %self.source_id,
                        time_ms = target_ms,
                        error = %e,
                        "decoder entered error state"
                    );
                } else {
                    debug!(source = %self.source_id, time_ms = target_ms, error = %e, "seek failed");
                }
                Err(e)
            }
        }
    }

    /// Read sequentially until a frame satisfies `target_ms`.
    fn read_until(&mut self, target_ms: i64, max_reads: Option<usize>) -> DecodeOutcome {
        let mut reads = 0usize;
        loop {
            match self.source.read_frame() {
                Ok(Some(raw)) => {
                    reads += 1;
                    self.stats.frames_read += 1;
                    let frame = match to_frame(raw) {
                        Ok(frame) => frame,
                        Err(e) => return self.read_failed(target_ms, e),
                    };
                    self.last_good = Some(frame.clone());
                    let limit_hit = max_reads.is_some_and(|max| reads >= max);
                    if self.satisfies(frame.timestamp_ms, target_ms) || limit_hit {
                        return DecodeOutcome::Frame(frame);
                    }
                }
                Ok(None) => {
                    self.state = DecoderState::EndOfStream;
                    debug!(source = %self.source_id, time_ms = target_ms, "end of stream");
                    return match &self.last_good {
                        Some(frame) => DecodeOutcome::EndOfStream(frame.clone()),
                        None => DecodeOutcome::EndOfStreamEmpty,
                    };
                }
                Err(e) => return self.read_failed(target_ms, e),
            }
        }
    }

    fn read_failed(&mut self, target_ms: i64, error: SourceError) -> DecodeOutcome {
        self.stats.read_errors += 1;
        warn!(source = %self.source_id, time_ms = target_ms, error = %error, "frame skipped");
        self.last_error = Some(error.to_string());
        DecodeOutcome::FrameSkipped
    }
}

fn to_frame(raw: SourceFrame) -> std::result::Result<Frame, SourceError> {
    Frame::from_rgba(raw.width, raw.height, raw.rgba, raw.pts_ms)
        .map_err(|e| SourceError::Corrupt(e.to_string()))
}
