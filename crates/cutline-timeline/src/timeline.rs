//! Timeline and timeline-time resolution.

use cutline_core::{CutlineError, Result, SourceId, MAX_TIME_MS};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::Clip;
use crate::track::Track;

/// Where a timeline time lands in the media.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution<'a> {
    pub clip: &'a Clip,
    pub source_time_ms: i64,
}

impl Resolution<'_> {
    pub fn source(&self) -> &SourceId {
        &self.clip.source
    }
}

/// Stack of video tracks. Index 0 is the top track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    pub video_tracks: Vec<Track>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// A timeline with one track holding `clips`.
    pub fn single_track(clips: impl IntoIterator<Item = Clip>) -> Self {
        let mut track = Track::new("V1");
        for clip in clips {
            track.add_clip(clip);
        }
        Self {
            video_tracks: vec![track],
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut timeline: Self = serde_json::from_str(json)?;
        for track in &mut timeline.video_tracks {
            track.sort_clips();
        }
        Ok(timeline)
    }

    /// Append a track below the existing ones and return its index.
    pub fn add_track(&mut self, name: impl Into<String>) -> usize {
        self.video_tracks.push(Track::new(name));
        self.video_tracks.len() - 1
    }

    /// Add a clip to track `track_index`, creating missing tracks.
    pub fn add_clip(&mut self, track_index: usize, clip: Clip) -> Result<Uuid> {
        if clip.duration_ms <= 0 {
            return Err(CutlineError::InvalidParameter(format!(
                "clip duration must be positive, got {} ms",
                clip.duration_ms
            )));
        }
        if clip.timeline_start_ms < 0 {
            return Err(CutlineError::InvalidParameter(format!(
                "clip cannot start before 0, got {} ms",
                clip.timeline_start_ms
            )));
        }
        let in_range = |start: i64| {
            start
                .checked_add(clip.duration_ms)
                .is_some_and(|end| end <= MAX_TIME_MS)
        };
        if !in_range(clip.timeline_start_ms) {
            return Err(CutlineError::InvalidParameter(format!(
                "clip ending past {} ms on the timeline",
                MAX_TIME_MS
            )));
        }
        if !in_range(clip.trim_offset_ms) {
            return Err(CutlineError::InvalidParameter(format!(
                "clip reaches past {} ms in its source",
                MAX_TIME_MS
            )));
        }
        while self.video_tracks.len() <= track_index {
            let name = format!("V{}", self.video_tracks.len() + 1);
            self.add_track(name);
        }
        let id = clip.id;
        self.video_tracks[track_index].add_clip(clip);
        Ok(id)
    }

    pub fn remove_clip(&mut self, id: Uuid) -> Result<Clip> {
        self.video_tracks
            .iter_mut()
            .find_map(|track| track.remove_clip(id))
            .ok_or_else(|| CutlineError::NotFound(format!("clip {}", id)))
    }

    pub fn clear(&mut self) {
        self.video_tracks.clear();
    }

    /// End of the last clip on any track.
    pub fn duration_ms(&self) -> i64 {
        self.video_tracks
            .iter()
            .map(Track::duration_ms)
            .max()
            .unwrap_or(0)
    }

    /// Distinct sources referenced by the timeline.
    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self
            .video_tracks
            .iter()
            .flat_map(|track| track.clips().iter().map(|c| c.source.clone()))
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }

    /// Resolve timeline time `t` to the clip on top and its source time.
    pub fn resolve(&self, t: i64) -> Option<Resolution<'_>> {
        if t < 0 {
            return None;
        }
        self.video_tracks
            .iter()
            .filter(|track| track.enabled)
            .find_map(|track| track.clip_at(t))
            .map(|clip| Resolution {
                clip,
                source_time_ms: clip.source_time_ms(t),
            })
    }
}
