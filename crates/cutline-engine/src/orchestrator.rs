//! Render orchestrator.
//!
//! `render` is the single entry point for frame requests from every thread.
//! It never waits: the decoder pool, the frame cache and the last rendered
//! frame live behind one mutex that is only ever try-locked on the render
//! path, and a busy lock turns into `RenderOutcome::Skipped`. Failures from
//! the decoder or the cache never escape; the caller always gets a decoded
//! frame, the last good frame, a blank frame, or "skipped".
//!
//! Callers outside the render path never wait on that mutex either. Cache
//! and pool counters are published at the end of every critical section,
//! and a playback mode switch is queued and applied when the next render or
//! prefetch step takes the lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cutline_core::{EngineConfig, Frame, Result, SourceId};
use cutline_media::{
    generate_thumbnail, opener_for, DecodeOutcome, DecodePath, DecoderState, SourceOpener,
    StreamInfo,
};
use cutline_timeline::Timeline;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, FrameCache};
use crate::pool::{DecoderPool, PoolStats};
use crate::prefetch::{PrefetchCommand, PrefetchStats, PrefetchStep, PrefetchTarget, Prefetcher};
use crate::stats::{PublishedStats, RenderStats, RenderStatsSnapshot};

/// Renders between diagnostic log lines.
const DIAGNOSTIC_INTERVAL: u64 = 30;

/// Where a rendered frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameOrigin {
    /// Freshly decoded for this request.
    Decoded,
    /// Served from the frame cache.
    CacheHit,
    /// The source ended before the requested time; its last frame.
    EndOfStream,
    /// The previous good frame, shown because decoding failed.
    Fallback,
    /// Nothing to show at this time.
    Blank,
}

/// A frame ready for display, stamped with timeline time.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame: Frame,
    pub origin: FrameOrigin,
}

/// Result of a render request.
#[derive(Debug, Clone)]
pub enum RenderOutcome {
    Rendered(RenderedFrame),
    /// Another render held the engine. Nothing new this call.
    Skipped,
}

impl RenderOutcome {
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Self::Rendered(rendered) => Some(&rendered.frame),
            Self::Skipped => None,
        }
    }

    pub fn origin(&self) -> Option<FrameOrigin> {
        match self {
            Self::Rendered(rendered) => Some(rendered.origin),
            Self::Skipped => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Everything the render path mutates, guarded together.
struct EngineState {
    pool: DecoderPool,
    cache: FrameCache,
    last_rendered: Option<Frame>,
    /// File and cache key of the previous render that reached a source.
    last_key: Option<(SourceId, i64)>,
}

/// Work to hand to the prefetcher once the lock is released.
#[derive(Default)]
struct Followup {
    flush: Option<SourceId>,
    prefetch: Option<PrefetchCommand>,
}

/// Shared render core. The prefetch worker holds a reference to it.
struct RenderCore {
    state: Mutex<EngineState>,
    timeline: RwLock<Arc<Timeline>>,
    streams: RwLock<HashMap<SourceId, StreamInfo>>,
    opener: Arc<dyn SourceOpener>,
    config: EngineConfig,
    playing: AtomicBool,
    /// Set by `set_playback_mode`, cleared once the pool has caught up.
    mode_changed: AtomicBool,
    stats: RenderStats,
    published: PublishedStats,
    blank: Frame,
}

/// All engine counters at once.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct EngineStats {
    pub render: RenderStatsSnapshot,
    pub cache: CacheStats,
    pub pool: PoolStats,
    pub prefetch: PrefetchStats,
}

/// Serializes frame requests against the shared decoder pool and cache.
pub struct RenderOrchestrator {
    core: Arc<RenderCore>,
    prefetcher: Option<Prefetcher>,
}

impl RenderOrchestrator {
    /// Engine with the opener selected by `config.backend`.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let opener = opener_for(&config);
        Self::new(config, opener)
    }

    pub fn new(config: EngineConfig, opener: Arc<dyn SourceOpener>) -> Result<Self> {
        config.validate()?;

        let pool = DecoderPool::new(
            Arc::clone(&opener),
            config.pool.max_decoders,
            config.decoder.forward_threshold_ms(false),
            config.decoder.max_seek_attempts,
        );
        let cache = FrameCache::new(config.cache.max_entries, config.cache.max_bytes);
        let blank = Frame::blank(config.output.blank_width, config.output.blank_height, 0);
        let published = PublishedStats::default();
        published.publish(&cache.stats(), &pool.stats());

        let core = Arc::new(RenderCore {
            state: Mutex::new(EngineState {
                pool,
                cache,
                last_rendered: None,
                last_key: None,
            }),
            timeline: RwLock::new(Arc::new(Timeline::new())),
            streams: RwLock::new(HashMap::new()),
            opener,
            config,
            playing: AtomicBool::new(false),
            mode_changed: AtomicBool::new(false),
            stats: RenderStats::default(),
            published,
            blank,
        });

        let prefetcher = if core.config.prefetch.enabled {
            let target: Arc<dyn PrefetchTarget> = core.clone();
            Some(Prefetcher::spawn(target, &core.config.prefetch)?)
        } else {
            None
        };

        info!(
            backend = ?core.config.backend,
            cache_entries = core.config.cache.max_entries,
            cache_bytes = core.config.cache.max_bytes,
            prefetch = core.config.prefetch.enabled,
            "render engine created"
        );
        Ok(Self { core, prefetcher })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.core.config
    }

    /// Produce the frame for timeline time `timeline_time_ms`. Never blocks
    /// on another render and never fails.
    pub fn render(&self, timeline_time_ms: i64) -> RenderOutcome {
        let (outcome, followup) = self.core.render(timeline_time_ms);
        if let Some(prefetcher) = &self.prefetcher {
            if let Some(file) = followup.flush {
                prefetcher.flush(&file);
            }
            if let Some(command) = followup.prefetch {
                prefetcher.submit(command);
            }
        }
        outcome
    }

    /// Switch between playback and scrub seek policy. Decoders pick up the
    /// new threshold when the next render or prefetch step runs.
    pub fn set_playback_mode(&self, playing: bool) {
        self.core.playing.store(playing, Ordering::Release);
        self.core.mode_changed.store(true, Ordering::Release);
        debug!(playing, "playback mode queued");
    }

    pub fn is_playing(&self) -> bool {
        self.core.playing.load(Ordering::Acquire)
    }

    /// Drop every cached frame and pending prefetch work.
    pub fn clear_cache(&self) {
        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.flush_all();
        }
        let mut state = self.core.state.lock();
        state.cache.clear();
        self.core.publish(&state);
        debug!("frame cache cleared");
    }

    /// Cache counters as of the last finished critical section.
    pub fn cache_stats(&self) -> CacheStats {
        self.core.published.cache()
    }

    /// Replace the timeline. Cached frames stay valid; they are keyed by
    /// source time.
    pub fn set_timeline(&self, timeline: Timeline) {
        *self.core.timeline.write() = Arc::new(timeline);
        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.flush_all();
        }
    }

    /// Apply an edit to a copy of the timeline and publish it.
    pub fn edit_timeline<R>(&self, edit: impl FnOnce(&mut Timeline) -> R) -> R {
        let mut guard = self.core.timeline.write();
        let mut next = Timeline::clone(&guard);
        let result = edit(&mut next);
        *guard = Arc::new(next);
        result
    }

    /// Current timeline snapshot.
    pub fn timeline(&self) -> Arc<Timeline> {
        Arc::clone(&*self.core.timeline.read())
    }

    pub fn timeline_duration_ms(&self) -> i64 {
        self.core.timeline.read().duration_ms()
    }

    /// Scrub hint: the user is heading to `timeline_time_ms`. Drops queued
    /// prefetch work for that file and warms up the target frame.
    pub fn request_seek(&self, timeline_time_ms: i64) -> bool {
        let prefetcher = match &self.prefetcher {
            Some(prefetcher) => prefetcher,
            None => return false,
        };
        let timeline = self.timeline();
        let hit = match timeline.resolve(timeline_time_ms) {
            Some(hit) => hit,
            None => return false,
        };
        let file = hit.clip.source.clone();
        let time_ms = self.core.snap(&file, hit.source_time_ms);
        prefetcher.submit(PrefetchCommand::Seek { file, time_ms })
    }

    /// One-shot thumbnail that bypasses the decoder pool.
    pub fn generate_thumbnail(
        &self,
        file: &SourceId,
        source_time_ms: i64,
        width: u32,
        height: u32,
    ) -> Result<Frame> {
        generate_thumbnail(
            self.core.opener.as_ref(),
            file,
            source_time_ms,
            width,
            height,
        )
    }

    /// The most recent frame shown, if any.
    pub fn last_rendered(&self) -> Option<Frame> {
        self.core.state.lock().last_rendered.clone()
    }

    pub fn render_stats(&self) -> RenderStatsSnapshot {
        self.core.stats.snapshot()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            render: self.core.stats.snapshot(),
            cache: self.core.published.cache(),
            pool: self.core.published.pool(),
            prefetch: self
                .prefetcher
                .as_ref()
                .map(Prefetcher::stats)
                .unwrap_or_default(),
        }
    }
}

impl Drop for RenderOrchestrator {
    fn drop(&mut self) {
        // Stop the worker before tearing down decoders
        self.prefetcher.take();
        self.core.state.lock().pool.clear();
        info!("render engine shut down");
    }
}

impl RenderCore {
    /// Snap a source time onto the file's frame grid once its rate is known.
    fn snap(&self, file: &SourceId, source_time_ms: i64) -> i64 {
        match self.streams.read().get(file) {
            Some(info) => info.frame_rate.snap_ms(source_time_ms),
            None => source_time_ms,
        }
    }

    fn remember_stream(&self, file: &SourceId, info: StreamInfo) {
        if self.streams.read().contains_key(file) {
            return;
        }
        self.streams.write().insert(file.clone(), info);
    }

    /// Bring the pool in line with a queued playback mode switch. Pausing
    /// also closes decoders nobody has used for a while.
    fn apply_mode(&self, state: &mut EngineState) {
        if !self.mode_changed.swap(false, Ordering::AcqRel) {
            return;
        }
        let playing = self.playing.load(Ordering::Acquire);
        let threshold = self.config.decoder.forward_threshold_ms(playing);
        state.pool.set_forward_threshold_all(threshold);
        if playing {
            let dropped = state.pool.evict_failed();
            if dropped > 0 {
                info!(dropped, "reopening failed decoders for playback");
            }
        } else {
            let closed = state.pool.evict_idle(self.config.pool.idle_timeout_secs);
            if closed > 0 {
                debug!(closed, "closed idle decoders on pause");
            }
        }
        debug!(playing, threshold_ms = threshold, "playback mode applied");
    }

    fn publish(&self, state: &EngineState) {
        self.published.publish(&state.cache.stats(), &state.pool.stats());
    }

    /// Whether going from the previous render to `key` in `file` is a jump
    /// the decoder would have to seek for.
    fn is_jump(&self, previous: Option<&(SourceId, i64)>, file: &SourceId, key: i64) -> bool {
        match previous {
            Some((prev_file, prev_key)) if prev_file == file => {
                let gap = key.saturating_sub(*prev_key);
                let playing = self.playing.load(Ordering::Acquire);
                gap < 0 || gap > self.config.decoder.forward_threshold_ms(playing)
            }
            _ => false,
        }
    }

    fn blank_at(&self, timeline_time_ms: i64) -> RenderedFrame {
        self.stats.record_blank();
        RenderedFrame {
            frame: self.blank.restamped(timeline_time_ms),
            origin: FrameOrigin::Blank,
        }
    }

    fn fallback(&self, state: &EngineState, timeline_time_ms: i64) -> RenderedFrame {
        match &state.last_rendered {
            Some(frame) => {
                self.stats.record_fallback();
                RenderedFrame {
                    frame: frame.restamped(timeline_time_ms),
                    origin: FrameOrigin::Fallback,
                }
            }
            None => self.blank_at(timeline_time_ms),
        }
    }

    fn lookahead(&self, file: SourceId, start_time_ms: i64) -> Option<PrefetchCommand> {
        let count = self.config.prefetch.frames_ahead;
        (self.config.prefetch.enabled && count > 0).then_some(PrefetchCommand::Prefetch {
            file,
            start_time_ms,
            count,
        })
    }

    fn log_diagnostics(&self, calls: u64) {
        if calls % DIAGNOSTIC_INTERVAL == 0 {
            let s = self.stats.snapshot();
            debug!(
                total = s.total,
                cache_hits = s.cache_hits,
                decoded = s.decoded,
                end_of_stream = s.end_of_stream,
                fallbacks = s.fallbacks,
                blanks = s.blanks,
                contended = s.contended,
                open_failures = s.open_failures,
                "render diagnostics"
            );
        }
    }

    fn render(&self, timeline_time_ms: i64) -> (RenderOutcome, Followup) {
        let calls = self.stats.record_call();
        self.log_diagnostics(calls);

        let mut guard = match self.state.try_lock() {
            Some(guard) => guard,
            None => {
                self.stats.record_contention();
                return (RenderOutcome::Skipped, Followup::default());
            }
        };
        let _in_flight = self.stats.enter();
        self.apply_mode(&mut guard);
        let result = self.render_locked(&mut guard, timeline_time_ms);
        self.publish(&guard);
        result
    }

    fn render_locked(
        &self,
        state: &mut EngineState,
        timeline_time_ms: i64,
    ) -> (RenderOutcome, Followup) {
        let timeline = match self.timeline.try_read() {
            Some(timeline) => Arc::clone(&*timeline),
            None => {
                self.stats.record_contention();
                return (RenderOutcome::Skipped, Followup::default());
            }
        };

        let (file, source_time_ms) = match timeline.resolve(timeline_time_ms) {
            Some(hit) => (hit.clip.source.clone(), hit.source_time_ms),
            None => {
                let rendered = self.blank_at(timeline_time_ms);
                return (RenderOutcome::Rendered(rendered), Followup::default());
            }
        };

        let (rendered, followup) =
            self.render_source(state, file, source_time_ms, timeline_time_ms);
        (RenderOutcome::Rendered(rendered), followup)
    }

    /// Serve a cached frame. A distant jump still flushes prefetch work
    /// queued for the old position.
    fn serve_cached(
        &self,
        state: &mut EngineState,
        file: SourceId,
        key: i64,
        frame: Frame,
        timeline_time_ms: i64,
    ) -> (RenderedFrame, Followup) {
        self.stats.record_hit();
        let jumped = self.is_jump(state.last_key.as_ref(), &file, key);
        state.last_key = Some((file.clone(), key));
        state.last_rendered = Some(frame.clone());
        let followup = Followup {
            flush: jumped.then(|| file.clone()),
            prefetch: self.lookahead(file, key),
        };
        let rendered = RenderedFrame {
            frame: frame.restamped(timeline_time_ms),
            origin: FrameOrigin::CacheHit,
        };
        (rendered, followup)
    }

    fn render_source(
        &self,
        state: &mut EngineState,
        file: SourceId,
        source_time_ms: i64,
        timeline_time_ms: i64,
    ) -> (RenderedFrame, Followup) {
        let mut key = self.snap(&file, source_time_ms);
        if let Some(frame) = state.cache.get(&file, key) {
            return self.serve_cached(state, file, key, frame, timeline_time_ms);
        }

        let info = match state.pool.get_or_open(&file) {
            Ok(decoder) => *decoder.info(),
            Err(e) => {
                self.stats.record_open_failure();
                warn!(source = %file, error = %e, "cannot open source");
                return (self.fallback(state, timeline_time_ms), Followup::default());
            }
        };
        self.remember_stream(&file, info);

        let snapped = info.frame_rate.snap_ms(source_time_ms);
        if snapped != key {
            // First request for this file, the grid was unknown until now
            key = snapped;
            if let Some(frame) = state.cache.get(&file, key) {
                return self.serve_cached(state, file, key, frame, timeline_time_ms);
            }
        }
        state.last_key = Some((file.clone(), key));

        let decoder = match state.pool.get_or_open(&file) {
            Ok(decoder) => decoder,
            Err(e) => {
                self.stats.record_open_failure();
                warn!(source = %file, error = %e, "cannot open source");
                return (self.fallback(state, timeline_time_ms), Followup::default());
            }
        };
        let path = decoder.plan(key);
        let outcome = decoder.decode(key);
        let ready = decoder.state() == DecoderState::Ready;

        let mut followup = Followup {
            flush: (path == DecodePath::Seek).then(|| file.clone()),
            prefetch: None,
        };

        let rendered = match outcome {
            DecodeOutcome::Frame(frame) if ready => {
                self.stats.record_decode();
                state.cache.put(&file, key, frame.clone());
                state.last_rendered = Some(frame.clone());
                if self.playing.load(Ordering::Acquire) {
                    followup.prefetch = self.lookahead(file, key);
                }
                RenderedFrame {
                    frame: frame.restamped(timeline_time_ms),
                    origin: FrameOrigin::Decoded,
                }
            }
            DecodeOutcome::Frame(frame) => {
                // Decoder in its error state handed back its last good frame
                self.stats.record_fallback();
                state.last_rendered = Some(frame.clone());
                RenderedFrame {
                    frame: frame.restamped(timeline_time_ms),
                    origin: FrameOrigin::Fallback,
                }
            }
            DecodeOutcome::EndOfStream(frame) => {
                self.stats.record_end_of_stream();
                state.last_rendered = Some(frame.clone());
                RenderedFrame {
                    frame: frame.restamped(timeline_time_ms),
                    origin: FrameOrigin::EndOfStream,
                }
            }
            DecodeOutcome::FrameSkipped | DecodeOutcome::EndOfStreamEmpty => {
                self.fallback(state, timeline_time_ms)
            }
        };
        (rendered, followup)
    }

    fn prefetch_into(&self, state: &mut EngineState, file: &SourceId, time_ms: i64) -> PrefetchStep {
        if state.cache.contains(file, time_ms) {
            return PrefetchStep::Cached;
        }
        let decoder = match state.pool.get_or_open(file) {
            Ok(decoder) => decoder,
            Err(_) => return PrefetchStep::Failed,
        };
        let outcome = decoder.decode(time_ms);
        let ready = decoder.state() == DecoderState::Ready;
        match outcome {
            DecodeOutcome::Frame(frame) if ready => {
                state.cache.put(file, time_ms, frame);
                PrefetchStep::Decoded
            }
            _ => PrefetchStep::Failed,
        }
    }
}

impl PrefetchTarget for RenderCore {
    fn frame_time(&self, source: &SourceId, start_ms: i64, offset: i64) -> Option<i64> {
        let info = *self.streams.read().get(source)?;
        let rate = info.frame_rate;
        let t = rate.frame_to_ms(rate.nearest_frame(start_ms).saturating_add(offset));
        (info.duration_ms <= 0 || t < info.duration_ms).then_some(t)
    }

    fn prefetch_frame(&self, source: &SourceId, time_ms: i64) -> PrefetchStep {
        let mut guard = match self.state.try_lock() {
            Some(guard) => guard,
            None => return PrefetchStep::Contended,
        };
        let _in_flight = self.stats.enter();
        self.apply_mode(&mut guard);
        let step = self.prefetch_into(&mut guard, source, time_ms);
        self.publish(&guard);
        step
    }
}
