//! Degradation paths: corrupt frames, failing seeks, missing files, and
//! decode-ahead warm-up.

use std::sync::Arc;

use cutline_core::SourceId;
use cutline_engine::{FrameOrigin, RenderOrchestrator};
use cutline_media::synthetic::frame_index_of;
use cutline_media::{SyntheticOpener, SyntheticSpec};
use cutline_timeline::{Clip, Timeline};

use crate::support::{config, render_settled, wait_until, Fixture, CLIP};

#[test]
fn corrupt_frame_repeats_previous_frame() {
    let fixture = Fixture::new(config(), SyntheticSpec::default().with_corrupt_frame(10));
    let engine = &fixture.engine;

    for i in 0..10 {
        assert_eq!(engine.render(i * 33 + i / 3).origin(), Some(FrameOrigin::Decoded));
    }
    let bad = engine.render(333);
    assert_eq!(bad.origin(), Some(FrameOrigin::Fallback));
    assert_eq!(bad.frame().and_then(frame_index_of), Some(9));
    assert_eq!(bad.frame().map(|f| f.timestamp_ms), Some(333));

    let next = engine.render(366);
    assert_eq!(next.origin(), Some(FrameOrigin::Decoded));
    assert_eq!(next.frame().and_then(frame_index_of), Some(11));
}

#[test]
fn failing_seeks_freeze_frame_until_playback_reopens() {
    let fixture = Fixture::simple();
    let engine = &fixture.engine;
    engine.render(0);

    // Both attempts of the next seek fail and the decoder gives up
    fixture.counters().fail_next_seeks(2);
    let positions = [3_000, 3_033, 3_066, 7_000];
    for t in positions {
        let outcome = engine.render(t);
        assert_eq!(outcome.origin(), Some(FrameOrigin::Fallback));
        assert_eq!(outcome.frame().and_then(frame_index_of), Some(0));
        assert_eq!(outcome.frame().map(|f| f.timestamp_ms), Some(t));
    }

    engine.set_playback_mode(true);
    let recovered = engine.render(7_000);
    assert_eq!(recovered.origin(), Some(FrameOrigin::Decoded));
    assert_eq!(recovered.frame().and_then(frame_index_of), Some(210));
    assert_eq!(fixture.counters().opens(), 2);
}

#[test]
fn missing_file_between_good_clips() {
    let opener = Arc::new(
        SyntheticOpener::default().with_source("missing.mp4", SyntheticSpec::default().missing()),
    );
    let engine = RenderOrchestrator::new(config(), opener).unwrap();
    engine.set_timeline(Timeline::single_track([
        Clip::new(CLIP, 0, 1_000, 0),
        Clip::new("missing.mp4", 1_000, 1_000, 0),
        Clip::new(CLIP, 2_000, 1_000, 1_000),
    ]));

    assert_eq!(engine.render(500).origin(), Some(FrameOrigin::Decoded));
    let hole = engine.render(1_500);
    assert_eq!(hole.origin(), Some(FrameOrigin::Fallback));
    assert_eq!(hole.frame().and_then(frame_index_of), Some(15));
    assert_eq!(engine.render(2_500).origin(), Some(FrameOrigin::Decoded));

    let stats = engine.render_stats();
    assert_eq!(stats.open_failures, 1);
    assert_eq!(stats.fallbacks, 1);
}

#[test]
fn pool_closes_least_recent_decoder() {
    let mut config = config();
    config.pool.max_decoders = 2;
    let fixture = Fixture::new(config, SyntheticSpec::default());
    let files = ["one.mp4", "two.mp4", "three.mp4"];
    fixture.engine.set_timeline(Timeline::single_track(
        files
            .iter()
            .enumerate()
            .map(|(i, f)| Clip::new(*f, i as i64 * 1_000, 1_000, 0)),
    ));

    for t in [100, 1_100, 2_100] {
        assert_eq!(fixture.engine.render(t).origin(), Some(FrameOrigin::Decoded));
    }
    let pool = fixture.engine.stats().pool;
    assert_eq!(pool.active, 2);
    assert_eq!(pool.evicted, 1);

    // Reopened on demand
    assert_eq!(fixture.engine.render(200).origin(), Some(FrameOrigin::Decoded));
    assert_eq!(fixture.opener.counters(&SourceId::new("one.mp4")).opens(), 2);
}

#[test]
fn cache_hit_warms_following_frames() {
    let mut config = config();
    config.prefetch.enabled = true;
    let fixture = Fixture::new(config, SyntheticSpec::default());
    let engine = &fixture.engine;

    engine.render(0);
    assert_eq!(engine.render(0).origin(), Some(FrameOrigin::CacheHit));
    assert!(wait_until(|| engine.stats().prefetch.decoded == 5));

    // Each hit queues more decode-ahead, so the worker may briefly hold the engine
    let decoded = engine.render_stats().decoded;
    for t in [33, 66, 100, 133, 166] {
        assert_eq!(render_settled(engine, t).origin(), Some(FrameOrigin::CacheHit));
    }
    assert_eq!(engine.render_stats().decoded, decoded);
}

#[test]
fn scrub_hint_decodes_target_ahead_of_render() {
    let mut config = config();
    config.prefetch.enabled = true;
    let fixture = Fixture::new(config, SyntheticSpec::default());
    let engine = &fixture.engine;

    // The frame grid is learned on first open
    engine.render(0);
    assert!(engine.request_seek(5_000));
    assert!(wait_until(|| engine.stats().prefetch.decoded == 1));

    let outcome = render_settled(engine, 5_000);
    assert_eq!(outcome.origin(), Some(FrameOrigin::CacheHit));
    assert_eq!(outcome.frame().and_then(frame_index_of), Some(150));
}

#[test]
fn clear_cache_resets_and_next_render_decodes() {
    let fixture = Fixture::simple();
    let engine = &fixture.engine;
    engine.render(1_000);
    engine.render(1_033);
    assert_eq!(engine.cache_stats().frame_count, 2);

    engine.clear_cache();
    let stats = engine.cache_stats();
    assert_eq!((stats.frame_count, stats.total_bytes), (0, 0));
    assert_eq!(engine.render(1_000).origin(), Some(FrameOrigin::Decoded));
    assert!(engine.last_rendered().is_some());
}
