//! FFmpeg-backed frame source using ffmpeg-sidecar.
//!
//! FFmpeg runs as a subprocess writing raw RGBA to stdout. A seek restarts the
//! process with `-ss` ahead of `-i`, which makes FFmpeg jump to the keyframe
//! before the target and decode forward from there.

use cutline_core::{Result, SourceId};
use ffmpeg_sidecar::child::FfmpegChild;
use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::{FfmpegEvent, LogLevel};
use ffmpeg_sidecar::iter::FfmpegIterator;
use tracing::{debug, info, trace, warn};

use crate::probe::MediaProbe;
use crate::source::{FrameSource, SourceError, SourceFrame, SourceOpener, StreamInfo};

/// A running FFmpeg decode of one file.
pub struct FfmpegSource {
    path: String,
    info: StreamInfo,
    child: Option<FfmpegChild>,
    events: Option<FfmpegIterator>,
    /// Source time of the first frame the current process emits.
    base_ms: i64,
}

impl FfmpegSource {
    /// Create a source for `path`. No process is started until the first seek.
    pub fn new(path: impl Into<String>, info: StreamInfo) -> Self {
        Self {
            path: path.into(),
            info,
            child: None,
            events: None,
            base_ms: 0,
        }
    }

    fn stop(&mut self) {
        self.events = None;
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                trace!(path = %self.path, error = %e, "ffmpeg already exited");
            }
            let _ = child.wait();
        }
    }

    fn spawn_at(&mut self, start_ms: i64) -> std::result::Result<(), SourceError> {
        self.stop();

        let start_ms = start_ms.max(0);
        let position = format!("{:.3}", start_ms as f64 / 1000.0);
        let mut child = FfmpegCommand::new()
            .hide_banner()
            .args(["-ss", position.as_str()])
            .input(&self.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba"])
            .output("-")
            .spawn()
            .map_err(|e| SourceError::Process(format!("spawn failed: {}", e)))?;

        let events = child
            .iter()
            .map_err(|e| SourceError::Process(format!("cannot read ffmpeg output: {}", e)))?;

        debug!(path = %self.path, start_ms, "ffmpeg decode started");
        self.child = Some(child);
        self.events = Some(events);
        self.base_ms = start_ms;
        Ok(())
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn seek(&mut self, target_ms: i64) -> std::result::Result<(), SourceError> {
        let target_ms = if self.info.duration_ms > 0 {
            target_ms.min(self.info.duration_ms)
        } else {
            target_ms
        };
        self.spawn_at(target_ms)
    }

    fn read_frame(&mut self) -> std::result::Result<Option<SourceFrame>, SourceError> {
        let events = match self.events.as_mut() {
            Some(events) => events,
            None => return Err(SourceError::Process("no decode in progress".into())),
        };

        for event in events.by_ref() {
            match event {
                FfmpegEvent::OutputFrame(frame) => {
                    let pts_ms = self.base_ms + (frame.timestamp as f64 * 1000.0).round() as i64;
                    let expected = frame.width as usize * frame.height as usize * 4;
                    if frame.data.len() != expected {
                        return Err(SourceError::Corrupt(format!(
                            "frame at {} ms has {} bytes, expected {}",
                            pts_ms,
                            frame.data.len(),
                            expected
                        )));
                    }
                    return Ok(Some(SourceFrame {
                        pts_ms,
                        width: frame.width,
                        height: frame.height,
                        rgba: frame.data,
                    }));
                }
                FfmpegEvent::Error(message) => {
                    return Err(SourceError::Codec(message));
                }
                FfmpegEvent::Log(LogLevel::Fatal, message) => {
                    return Err(SourceError::Process(message));
                }
                FfmpegEvent::Log(LogLevel::Error, message) => {
                    warn!(path = %self.path, %message, "ffmpeg reported an error");
                }
                FfmpegEvent::Done => break,
                _ => {}
            }
        }

        self.events = None;
        Ok(None)
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Opens files with ffprobe for stream parameters and FFmpeg for frames.
#[derive(Debug, Default, Clone)]
pub struct FfmpegOpener;

impl FfmpegOpener {
    pub fn new() -> Self {
        Self
    }
}

impl SourceOpener for FfmpegOpener {
    fn open(&self, source: &SourceId) -> Result<Box<dyn FrameSource>> {
        let probe = MediaProbe::probe(source.path())?;
        let info = probe.stream_info()?;
        info!(
            path = %source,
            width = info.width,
            height = info.height,
            fps = %info.frame_rate,
            duration_ms = info.duration_ms,
            "opened video source"
        );
        Ok(Box::new(FfmpegSource::new(source.path(), info)))
    }
}
