//! Playback clock and scrub coalescing.
//!
//! Both drivers call `RenderOrchestrator::render` from their own thread and
//! hand the result to a [`FrameSink`]. Neither ever queues renders: the
//! playback clock skips ticks it overran, and the scrub driver only keeps the
//! most recent target.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use cutline_core::{CutlineError, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::orchestrator::{RenderOrchestrator, RenderOutcome, RenderedFrame};

/// Attempts per scrub target while the engine is busy.
const MAX_SCRUB_RETRIES: u32 = 100;

/// Receives frames produced by a driver.
pub trait FrameSink: Send + 'static {
    fn present(&mut self, frame: &RenderedFrame, playhead_ms: i64);
}

impl<F> FrameSink for F
where
    F: FnMut(&RenderedFrame, i64) + Send + 'static,
{
    fn present(&mut self, frame: &RenderedFrame, playhead_ms: i64) {
        self(frame, playhead_ms)
    }
}

/// Transport commands for the playback thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackControl {
    Play,
    Pause,
    Seek(i64),
    Stop,
}

#[derive(Default)]
struct PlaybackStatus {
    playhead_ms: AtomicI64,
    playing: AtomicBool,
    ticks: AtomicU64,
    presented: AtomicU64,
    skipped: AtomicU64,
    missed: AtomicU64,
}

/// Point-in-time view of the playback clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackSnapshot {
    pub playhead_ms: i64,
    pub playing: bool,
    /// Clock ticks that issued a render.
    pub ticks: u64,
    pub presented: u64,
    /// Renders that came back skipped.
    pub skipped: u64,
    /// Ticks dropped because the previous one overran.
    pub missed: u64,
}

/// Drift-free playback clock on a dedicated thread.
pub struct PlaybackDriver {
    tx: Sender<PlaybackControl>,
    status: Arc<PlaybackStatus>,
    handle: Option<JoinHandle<()>>,
}

impl PlaybackDriver {
    pub fn spawn(engine: Arc<RenderOrchestrator>, sink: impl FrameSink) -> Result<Self> {
        let (tx, rx) = unbounded();
        let status = Arc::new(PlaybackStatus::default());
        let interval_ms = engine.config().playback.tick_interval_ms.max(1);

        let clock = Clock {
            engine,
            sink: Box::new(sink),
            rx,
            status: Arc::clone(&status),
            interval_ms,
            playing: false,
            anchor: Instant::now(),
            anchor_pos: 0,
            tick: 0,
        };
        let handle = thread::Builder::new()
            .name("cutline-playback".into())
            .spawn(move || clock.run())
            .map_err(|e| CutlineError::Internal(format!("cannot start playback thread: {}", e)))?;

        Ok(Self {
            tx,
            status,
            handle: Some(handle),
        })
    }

    pub fn play(&self) {
        self.send(PlaybackControl::Play);
    }

    pub fn pause(&self) {
        self.send(PlaybackControl::Pause);
    }

    /// Move the playhead and present the frame there.
    pub fn seek(&self, timeline_time_ms: i64) {
        self.send(PlaybackControl::Seek(timeline_time_ms));
    }

    pub fn send(&self, control: PlaybackControl) {
        if self.tx.send(control).is_err() {
            warn!(?control, "playback thread is gone");
        }
    }

    pub fn playhead_ms(&self) -> i64 {
        self.status.playhead_ms.load(Ordering::Acquire)
    }

    pub fn is_playing(&self) -> bool {
        self.status.playing.load(Ordering::Acquire)
    }

    pub fn status(&self) -> PlaybackSnapshot {
        let s = &self.status;
        PlaybackSnapshot {
            playhead_ms: s.playhead_ms.load(Ordering::Acquire),
            playing: s.playing.load(Ordering::Acquire),
            ticks: s.ticks.load(Ordering::Relaxed),
            presented: s.presented.load(Ordering::Relaxed),
            skipped: s.skipped.load(Ordering::Relaxed),
            missed: s.missed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for PlaybackDriver {
    fn drop(&mut self) {
        let _ = self.tx.send(PlaybackControl::Stop);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("playback thread panicked");
            }
        }
    }
}

struct Clock {
    engine: Arc<RenderOrchestrator>,
    sink: Box<dyn FrameSink>,
    rx: Receiver<PlaybackControl>,
    status: Arc<PlaybackStatus>,
    interval_ms: u64,
    playing: bool,
    /// Wall-clock instant of tick 0.
    anchor: Instant,
    /// Playhead at tick 0.
    anchor_pos: i64,
    tick: u64,
}

impl Clock {
    fn run(mut self) {
        info!(interval_ms = self.interval_ms, "playback thread started");
        loop {
            let control = if self.playing {
                let next = Duration::from_millis(self.interval_ms.saturating_mul(self.tick + 1));
                match self.rx.recv_deadline(self.anchor + next) {
                    Ok(control) => Some(control),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            } else {
                match self.rx.recv() {
                    Ok(control) => Some(control),
                    Err(_) => break,
                }
            };

            match control {
                Some(PlaybackControl::Stop) => break,
                Some(control) => self.apply(control),
                None => self.on_tick(),
            }
        }
        if self.playing {
            self.set_playing(false);
        }
        info!("playback thread stopped");
    }

    fn apply(&mut self, control: PlaybackControl) {
        match control {
            PlaybackControl::Play if !self.playing => {
                let duration = self.engine.timeline_duration_ms();
                let mut start = self.status.playhead_ms.load(Ordering::Acquire);
                if start >= duration {
                    start = 0;
                }
                self.reanchor(start);
                self.set_playing(true);
                self.present(start);
            }
            PlaybackControl::Pause if self.playing => {
                self.set_playing(false);
            }
            PlaybackControl::Seek(target) => {
                let target = target.clamp(0, self.engine.timeline_duration_ms().max(0));
                debug!(time_ms = target, "playback seek");
                self.reanchor(target);
                self.present(target);
            }
            _ => {}
        }
    }

    fn on_tick(&mut self) {
        let elapsed = self.anchor.elapsed().as_millis() as u64;
        let due = elapsed / self.interval_ms;
        if due <= self.tick {
            return;
        }
        let missed = due - self.tick - 1;
        if missed > 0 {
            self.status.missed.fetch_add(missed, Ordering::Relaxed);
        }
        self.tick = due;

        let position = self.anchor_pos + (due * self.interval_ms) as i64;
        let duration = self.engine.timeline_duration_ms();
        if position >= duration {
            self.status.playhead_ms.store(duration.max(0), Ordering::Release);
            self.set_playing(false);
            info!(time_ms = duration, "reached end of timeline");
            return;
        }
        self.present(position);
    }

    fn reanchor(&mut self, position: i64) {
        self.anchor = Instant::now();
        self.anchor_pos = position;
        self.tick = 0;
    }

    fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
        self.status.playing.store(playing, Ordering::Release);
        self.engine.set_playback_mode(playing);
    }

    fn present(&mut self, position: i64) {
        self.status.playhead_ms.store(position, Ordering::Release);
        self.status.ticks.fetch_add(1, Ordering::Relaxed);
        match self.engine.render(position) {
            RenderOutcome::Rendered(rendered) => {
                self.sink.present(&rendered, position);
                self.status.presented.fetch_add(1, Ordering::Relaxed);
            }
            RenderOutcome::Skipped => {
                self.status.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[derive(Default)]
struct ScrubShared {
    target: Mutex<Option<i64>>,
    requests: AtomicU64,
    coalesced: AtomicU64,
    rendered: AtomicU64,
    retries: AtomicU64,
    abandoned: AtomicU64,
}

/// Scrub driver counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrubStats {
    pub requests: u64,
    /// Targets replaced by a newer one before they were rendered.
    pub coalesced: u64,
    pub rendered: u64,
    pub retries: u64,
    pub abandoned: u64,
}

/// Renders the latest scrub target on a dedicated thread.
pub struct ScrubDriver {
    shared: Arc<ScrubShared>,
    wake: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl ScrubDriver {
    pub fn spawn(engine: Arc<RenderOrchestrator>, sink: impl FrameSink) -> Result<Self> {
        let (wake, wake_rx) = bounded(1);
        let shared = Arc::new(ScrubShared::default());
        let retry = Duration::from_millis(engine.config().playback.scrub_retry_ms);

        let thread_shared = Arc::clone(&shared);
        let mut sink = sink;
        let handle = thread::Builder::new()
            .name("cutline-scrub".into())
            .spawn(move || scrub_loop(engine, &mut sink, wake_rx, thread_shared, retry))
            .map_err(|e| CutlineError::Internal(format!("cannot start scrub thread: {}", e)))?;

        Ok(Self {
            shared,
            wake: Some(wake),
            handle: Some(handle),
        })
    }

    /// Ask for the frame at `timeline_time_ms`. Replaces any pending target.
    pub fn scrub_to(&self, timeline_time_ms: i64) {
        self.shared.requests.fetch_add(1, Ordering::Relaxed);
        if self.shared.target.lock().replace(timeline_time_ms).is_some() {
            self.shared.coalesced.fetch_add(1, Ordering::Relaxed);
        }
        if let Some(wake) = &self.wake {
            // A full channel already holds a wake-up
            let _ = wake.try_send(());
        }
    }

    pub fn stats(&self) -> ScrubStats {
        let s = &self.shared;
        ScrubStats {
            requests: s.requests.load(Ordering::Relaxed),
            coalesced: s.coalesced.load(Ordering::Relaxed),
            rendered: s.rendered.load(Ordering::Relaxed),
            retries: s.retries.load(Ordering::Relaxed),
            abandoned: s.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ScrubDriver {
    fn drop(&mut self) {
        self.wake.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("scrub thread panicked");
            }
        }
    }
}

fn scrub_loop(
    engine: Arc<RenderOrchestrator>,
    sink: &mut dyn FrameSink,
    wake: Receiver<()>,
    shared: Arc<ScrubShared>,
    retry: Duration,
) {
    debug!("scrub thread started");
    while wake.recv().is_ok() {
        let mut attempts = 0u32;
        loop {
            let target = match shared.target.lock().take() {
                Some(target) => target,
                None => break,
            };
            match engine.render(target) {
                RenderOutcome::Rendered(rendered) => {
                    attempts = 0;
                    sink.present(&rendered, target);
                    shared.rendered.fetch_add(1, Ordering::Relaxed);
                }
                RenderOutcome::Skipped => {
                    shared.retries.fetch_add(1, Ordering::Relaxed);
                    attempts += 1;
                    let mut slot = shared.target.lock();
                    if slot.is_some() {
                        attempts = 0;
                    } else if attempts < MAX_SCRUB_RETRIES {
                        *slot = Some(target);
                    } else {
                        shared.abandoned.fetch_add(1, Ordering::Relaxed);
                        debug!(time_ms = target, "scrub target abandoned");
                        continue;
                    }
                    drop(slot);
                    thread::sleep(retry);
                }
            }
        }
    }
    debug!("scrub thread stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use cutline_core::EngineConfig;
    use cutline_media::synthetic::frame_index_of;
    use cutline_media::{SyntheticOpener, SyntheticSpec};
    use cutline_timeline::{Clip, Timeline};

    fn engine(clip_ms: i64, spec: SyntheticSpec) -> Arc<RenderOrchestrator> {
        let mut config = EngineConfig::default();
        config.playback.tick_interval_ms = 10;
        config.output.blank_width = 16;
        config.output.blank_height = 9;
        let opener = Arc::new(SyntheticOpener::new(spec));
        let engine = RenderOrchestrator::new(config, opener).unwrap();
        engine.set_timeline(Timeline::single_track([Clip::new("a.mp4", 0, clip_ms, 0)]));
        Arc::new(engine)
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn test_playback_advances_on_the_tick_grid() {
        let engine = engine(10_000, SyntheticSpec::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let driver = PlaybackDriver::spawn(Arc::clone(&engine), move |_: &RenderedFrame, t: i64| {
            sink_seen.lock().push(t);
        })
        .unwrap();

        driver.play();
        wait_until(|| driver.status().presented >= 6);
        assert!(engine.is_playing());
        driver.pause();
        wait_until(|| !driver.is_playing());
        assert!(!engine.is_playing());

        let seen = seen.lock().clone();
        assert!(seen.len() >= 6);
        assert_eq!(seen[0], 0);
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
        assert!(seen.iter().all(|t| t % 10 == 0));
    }

    #[test]
    fn test_end_of_timeline_pauses() {
        let engine = engine(100, SyntheticSpec::default());
        let driver = PlaybackDriver::spawn(Arc::clone(&engine), |_: &RenderedFrame, _: i64| {})
            .unwrap();
        driver.play();
        wait_until(|| driver.status().ticks > 0 && !driver.is_playing());
        let status = driver.status();
        assert!(!status.playing);
        assert_eq!(status.playhead_ms, 100);
        assert!(!engine.is_playing());
    }

    #[test]
    fn test_seek_presents_one_frame() {
        let engine = engine(10_000, SyntheticSpec::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let driver = PlaybackDriver::spawn(engine, move |r: &RenderedFrame, t: i64| {
            sink_seen.lock().push((t, frame_index_of(&r.frame), r.frame.timestamp_ms));
        })
        .unwrap();

        driver.seek(500);
        wait_until(|| driver.status().presented == 1);
        drop(driver);
        assert_eq!(*seen.lock(), vec![(500, Some(15), 500)]);
    }

    #[test]
    fn test_scrub_keeps_latest_target() {
        let spec = SyntheticSpec::default().with_read_delay(Duration::from_millis(2));
        let engine = engine(10_000, spec);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let scrub = ScrubDriver::spawn(engine, move |r: &RenderedFrame, t: i64| {
            sink_seen.lock().push((t, frame_index_of(&r.frame)));
        })
        .unwrap();

        for i in 1..=20 {
            scrub.scrub_to(i * 300);
        }
        wait_until(|| seen.lock().last().map(|(t, _)| *t) == Some(6_000));
        let stats = scrub.stats();
        drop(scrub);

        assert_eq!(stats.requests, 20);
        assert!(stats.coalesced > 0);
        assert!(stats.rendered < 20);
        assert_eq!(seen.lock().last().copied(), Some((6_000, Some(180))));
    }

    #[test]
    fn test_drivers_shut_down_cleanly() {
        let engine = engine(10_000, SyntheticSpec::default());
        let playback =
            PlaybackDriver::spawn(Arc::clone(&engine), |_: &RenderedFrame, _: i64| {}).unwrap();
        let scrub = ScrubDriver::spawn(Arc::clone(&engine), |_: &RenderedFrame, _: i64| {}).unwrap();
        playback.play();
        scrub.scrub_to(1_000);
        drop(playback);
        drop(scrub);
        assert!(!engine.is_playing());
        assert!(engine.render_stats().total >= 1);
    }
}
