//! Shared fixtures for the integration tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cutline_core::{EngineConfig, SourceId};
use cutline_engine::{RenderOrchestrator, RenderOutcome};
use cutline_media::{SourceCounters, SyntheticOpener, SyntheticSpec};
use cutline_timeline::{Clip, Timeline};

pub const CLIP: &str = "media/ten_seconds.mp4";

pub fn source() -> SourceId {
    SourceId::new(CLIP)
}

/// Engine config with prefetch off unless a test turns it on.
pub fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.prefetch.enabled = false;
    config.output.blank_width = 32;
    config.output.blank_height = 18;
    config
}

pub struct Fixture {
    pub engine: Arc<RenderOrchestrator>,
    pub opener: Arc<SyntheticOpener>,
}

impl Fixture {
    /// One ten-second 30 fps clip at timeline zero.
    pub fn new(config: EngineConfig, spec: SyntheticSpec) -> Self {
        let opener = Arc::new(SyntheticOpener::default().with_source(CLIP, spec));
        let engine = RenderOrchestrator::new(config, opener.clone()).unwrap();
        engine.set_timeline(Timeline::single_track([Clip::new(CLIP, 0, 10_000, 0)]));
        Self {
            engine: Arc::new(engine),
            opener,
        }
    }

    pub fn simple() -> Self {
        Self::new(config(), SyntheticSpec::default())
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        self.opener.counters(&source())
    }
}

pub fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    true
}

/// Render, retrying while another actor holds the engine.
pub fn render_settled(engine: &RenderOrchestrator, t: i64) -> RenderOutcome {
    for _ in 0..1_000 {
        let outcome = engine.render(t);
        if !outcome.is_skipped() {
            return outcome;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    RenderOutcome::Skipped
}
