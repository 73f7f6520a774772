//! Media file probing to get metadata without full decode.

use cutline_core::{CutlineError, FrameRate, Result};
use ffmpeg_sidecar::ffprobe::ffprobe_path;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::source::StreamInfo;

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaProbe {
    /// File path
    pub path: String,
    /// Duration in milliseconds
    pub duration_ms: i64,
    /// Video streams
    pub video_streams: Vec<VideoStreamInfo>,
    /// Audio streams
    pub audio_streams: Vec<AudioStreamInfo>,
    /// Container format
    pub format: String,
}

/// Information about a video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub index: usize,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub pixel_format: String,
    pub bit_rate: Option<u64>,
}

/// Information about an audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: Option<u64>,
}

// ── ffprobe JSON ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: usize,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    pix_fmt: Option<String>,
    bit_rate: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Parse ffprobe's "num/den" rate notation.
fn parse_rate(rate: &str) -> Option<FrameRate> {
    let (num, den) = rate.split_once('/').unwrap_or((rate, "1"));
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    let rate = FrameRate::new(num, den);
    rate.is_valid().then_some(rate)
}

fn seconds_to_ms(seconds: &str) -> Option<i64> {
    let seconds: f64 = seconds.trim().parse().ok()?;
    seconds
        .is_finite()
        .then(|| (seconds * 1000.0).round() as i64)
}

impl MediaProbe {
    /// Probe a media file with `ffprobe`.
    pub fn probe<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_string_lossy().to_string();

        // Check if file exists
        if !path.exists() {
            return Err(CutlineError::NotFound(format!(
                "File not found: {}",
                path_str
            )));
        }

        let output = ffprobe_command()
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .map_err(|e| CutlineError::Media(format!("cannot run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(CutlineError::Media(format!(
                "ffprobe failed for {}: {}",
                path_str,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        Self::from_ffprobe_json(&path_str, &json)
    }

    /// Build a probe result from `ffprobe -print_format json` output.
    pub fn from_ffprobe_json(path: &str, json: &str) -> Result<Self> {
        let parsed: ProbeOutput = serde_json::from_str(json)?;
        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        let mut stream_duration_ms = None;

        for stream in parsed.streams {
            let bit_rate = stream.bit_rate.as_deref().and_then(|b| b.parse().ok());
            match stream.codec_type.as_deref() {
                Some("video") => {
                    let frame_rate = stream
                        .avg_frame_rate
                        .as_deref()
                        .and_then(parse_rate)
                        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate))
                        .unwrap_or_default();
                    if stream_duration_ms.is_none() {
                        stream_duration_ms = stream.duration.as_deref().and_then(seconds_to_ms);
                    }
                    video_streams.push(VideoStreamInfo {
                        index: stream.index,
                        codec: stream.codec_name.unwrap_or_default(),
                        width: stream.width.unwrap_or(0),
                        height: stream.height.unwrap_or(0),
                        frame_rate,
                        pixel_format: stream.pix_fmt.unwrap_or_default(),
                        bit_rate,
                    });
                }
                Some("audio") => audio_streams.push(AudioStreamInfo {
                    index: stream.index,
                    codec: stream.codec_name.unwrap_or_default(),
                    sample_rate: stream
                        .sample_rate
                        .as_deref()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(0),
                    channels: stream.channels.unwrap_or(0),
                    bit_rate,
                }),
                _ => {}
            }
        }

        let (format, format_duration_ms) = match parsed.format {
            Some(format) => (
                format.format_name.unwrap_or_default(),
                format.duration.as_deref().and_then(seconds_to_ms),
            ),
            None => (String::new(), None),
        };

        let probe = Self {
            path: path.to_string(),
            duration_ms: format_duration_ms.or(stream_duration_ms).unwrap_or(0),
            video_streams,
            audio_streams,
            format,
        };
        debug!(path, duration_ms = probe.duration_ms, "probed media");
        Ok(probe)
    }

    /// Check if the file has video.
    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    /// Check if the file has audio.
    pub fn has_audio(&self) -> bool {
        !self.audio_streams.is_empty()
    }

    /// Get the primary video stream info.
    pub fn primary_video(&self) -> Option<&VideoStreamInfo> {
        self.video_streams.first()
    }

    /// Get the primary audio stream info.
    pub fn primary_audio(&self) -> Option<&AudioStreamInfo> {
        self.audio_streams.first()
    }

    /// Stream parameters of the primary video stream.
    pub fn stream_info(&self) -> Result<StreamInfo> {
        let video = self.primary_video().ok_or_else(|| {
            CutlineError::UnsupportedFormat(format!("{} has no video stream", self.path))
        })?;
        if video.width == 0 || video.height == 0 {
            return Err(CutlineError::UnsupportedFormat(format!(
                "{} reports an empty video size",
                self.path
            )));
        }
        Ok(StreamInfo {
            width: video.width,
            height: video.height,
            frame_rate: video.frame_rate,
            duration_ms: self.duration_ms,
        })
    }
}

/// `ffprobe`, resolved the same way ffmpeg-sidecar resolves `ffmpeg`.
fn ffprobe_command() -> Command {
    Command::new(ffprobe_path())
}
