//! Admission control under concurrent callers.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use cutline_engine::{PlaybackDriver, RenderOutcome, RenderedFrame, ScrubDriver};
use cutline_media::SyntheticSpec;

use crate::support::{config, wait_until, Fixture};

const DECODE_COST: Duration = Duration::from_millis(50);

fn slow_fixture(prefetch: bool) -> Fixture {
    let mut config = config();
    config.prefetch.enabled = prefetch;
    config.playback.tick_interval_ms = 10;
    let spec = SyntheticSpec::default()
        .with_keyframe_interval(1)
        .with_read_delay(DECODE_COST);
    Fixture::new(config, spec)
}

// ── Scenario C: a burst of callers ─────────────────────────────

#[test]
fn burst_of_renders_never_queues() {
    let fixture = slow_fixture(false);
    let callers = 30;
    let barrier = Arc::new(Barrier::new(callers));

    let handles: Vec<_> = (0..callers)
        .map(|i| {
            let engine = Arc::clone(&fixture.engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let started = Instant::now();
                let outcome = engine.render(i as i64 * 33);
                (outcome, started.elapsed())
            })
        })
        .collect();
    let results: Vec<(RenderOutcome, Duration)> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    let skipped: Vec<Duration> = results
        .iter()
        .filter(|(outcome, _)| outcome.is_skipped())
        .map(|(_, elapsed)| *elapsed)
        .collect();
    let rendered = results.len() - skipped.len();

    let stats = fixture.engine.render_stats();
    assert!(rendered >= 1);
    assert_eq!(stats.total, callers as u64);
    assert_eq!(stats.contended, skipped.len() as u64);
    assert!(stats.decoded <= stats.total);
    assert!(stats.max_in_flight <= 1);
    for elapsed in skipped {
        assert!(elapsed < DECODE_COST, "skipped call took {:?}", elapsed);
    }
}

#[test]
fn in_flight_never_exceeds_one_with_every_actor_running() {
    let fixture = slow_fixture(true);
    let engine = Arc::clone(&fixture.engine);
    let _ = engine.render(0);

    let playback = PlaybackDriver::spawn(Arc::clone(&engine), |_: &RenderedFrame, _: i64| {})
        .unwrap();
    let scrub = ScrubDriver::spawn(Arc::clone(&engine), |_: &RenderedFrame, _: i64| {}).unwrap();
    playback.play();

    let hammer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_millis(300);
            let mut t = 5_000;
            while Instant::now() < deadline {
                let _ = engine.render(t);
                t = (t + 97) % 10_000;
            }
        })
    };
    for target in (0..10).map(|i| i * 700) {
        scrub.scrub_to(target);
        engine.request_seek(target);
        thread::sleep(Duration::from_millis(20));
    }
    hammer.join().unwrap();
    drop(scrub);
    drop(playback);

    let s = engine.render_stats();
    assert!(s.max_in_flight <= 1);
    assert_eq!(
        s.total,
        s.cache_hits + s.decoded + s.end_of_stream + s.fallbacks + s.blanks + s.contended
    );
    assert!(s.contended > 0);
}

#[test]
fn playback_ticks_are_presented_or_skipped() {
    let fixture = slow_fixture(false);
    let engine = Arc::clone(&fixture.engine);
    let driver = PlaybackDriver::spawn(Arc::clone(&engine), |_: &RenderedFrame, _: i64| {})
        .unwrap();
    driver.play();

    // Competing caller holds the engine for a decode now and then
    let competitor = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for t in [4_000, 6_000, 8_000] {
                let _ = engine.render(t);
                thread::sleep(Duration::from_millis(30));
            }
        })
    };
    competitor.join().unwrap();
    assert!(wait_until(|| driver.status().presented >= 3));
    driver.pause();
    assert!(wait_until(|| !driver.is_playing()));

    let status = driver.status();
    assert_eq!(status.presented + status.skipped, status.ticks);
    // Slow decodes overrun the 10 ms tick; late ticks are dropped, not queued
    assert!(status.missed > 0);
}
