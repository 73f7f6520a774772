//! Track types for the timeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clip::Clip;

/// A video track holding clips ordered by timeline position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    /// Unique track ID
    pub id: Uuid,
    /// Track name
    pub name: String,
    /// Clips sorted by `timeline_start_ms`
    clips: Vec<Clip>,
    /// Is track enabled
    pub enabled: bool,
}

impl Track {
    /// Create a new, empty video track.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            clips: Vec::new(),
            enabled: true,
        }
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    /// Insert a clip, keeping the track ordered by start time.
    pub fn add_clip(&mut self, clip: Clip) {
        let index = self
            .clips
            .partition_point(|c| c.timeline_start_ms <= clip.timeline_start_ms);
        self.clips.insert(index, clip);
    }

    /// Restore start-time order, e.g. after deserializing.
    pub fn sort_clips(&mut self) {
        self.clips.sort_by_key(|c| c.timeline_start_ms);
    }

    /// Remove a clip by UUID.
    pub fn remove_clip(&mut self, id: Uuid) -> Option<Clip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    pub fn find_clip(&self, id: Uuid) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    /// The enabled clip covering `t`. Later clips win on overlap.
    pub fn clip_at(&self, t: i64) -> Option<&Clip> {
        let end = self.clips.partition_point(|c| c.timeline_start_ms <= t);
        self.clips[..end]
            .iter()
            .rev()
            .find(|c| c.enabled && c.covers(t))
    }

    /// End of the last clip on this track.
    pub fn duration_ms(&self) -> i64 {
        self.clips
            .iter()
            .map(Clip::timeline_end_ms)
            .max()
            .unwrap_or(0)
    }

    pub fn clip_count(&self) -> usize {
        self.clips.len()
    }

    pub fn clear(&mut self) {
        self.clips.clear();
    }
}
