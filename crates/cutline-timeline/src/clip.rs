//! Clip types for the timeline.

use cutline_core::SourceId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A span of one source placed on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Unique clip ID
    pub id: Uuid,
    /// Media file this clip plays
    pub source: SourceId,
    /// Position on the timeline
    pub timeline_start_ms: i64,
    /// Duration on timeline
    pub duration_ms: i64,
    /// Source time shown at `timeline_start_ms`
    pub trim_offset_ms: i64,
    /// Is clip enabled
    pub enabled: bool,
}

impl Clip {
    pub fn new(
        source: impl Into<SourceId>,
        timeline_start_ms: i64,
        duration_ms: i64,
        trim_offset_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            timeline_start_ms,
            duration_ms: duration_ms.max(0),
            trim_offset_ms: trim_offset_ms.max(0),
            enabled: true,
        }
    }

    /// End time on the timeline (exclusive).
    #[inline]
    pub fn timeline_end_ms(&self) -> i64 {
        self.timeline_start_ms.saturating_add(self.duration_ms)
    }

    /// Whether `t` falls in `[start, start + duration)`.
    #[inline]
    pub fn covers(&self, t: i64) -> bool {
        t >= self.timeline_start_ms && t < self.timeline_end_ms()
    }

    /// Source time for timeline time `t`. Does not check coverage.
    #[inline]
    pub fn source_time_ms(&self, t: i64) -> i64 {
        t.saturating_sub(self.timeline_start_ms)
            .saturating_add(self.trim_offset_ms)
    }

    /// Last source time this clip shows (exclusive).
    pub fn source_out_ms(&self) -> i64 {
        self.trim_offset_ms.saturating_add(self.duration_ms)
    }

    /// Move the in point by `delta_ms`, keeping the out point.
    pub fn trim_in(&mut self, delta_ms: i64) {
        let delta = delta_ms.clamp(-self.trim_offset_ms, self.duration_ms);
        self.timeline_start_ms = self.timeline_start_ms.saturating_add(delta);
        self.trim_offset_ms = self.trim_offset_ms.saturating_add(delta);
        self.duration_ms = self.duration_ms.saturating_sub(delta);
    }

    /// Move the out point by `delta_ms`.
    pub fn trim_out(&mut self, delta_ms: i64) {
        self.duration_ms = self.duration_ms.saturating_add(delta_ms).max(0);
    }
}
