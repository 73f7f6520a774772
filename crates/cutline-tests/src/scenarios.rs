//! End-to-end scenarios against a ten-second, 30 fps synthetic source.

use std::sync::Arc;

use cutline_core::{Frame, SourceId};
use cutline_engine::{FrameCache, FrameOrigin};
use cutline_media::synthetic::frame_index_of;
use cutline_media::{
    DecodeOutcome, Decoder, DecoderState, SourceCounters, SyntheticSource, SyntheticSpec,
};
use cutline_timeline::{Clip, Timeline};
use proptest::prelude::*;

use crate::support::{config, source, Fixture, CLIP};

// ── Helpers ────────────────────────────────────────────────────

fn decoder(threshold_ms: i64) -> (Decoder, Arc<SourceCounters>) {
    let counters = Arc::new(SourceCounters::default());
    let stream = SyntheticSource::new(SyntheticSpec::default(), counters.clone());
    let decoder = Decoder::new(source(), Box::new(stream), threshold_ms, 2);
    (decoder, counters)
}

fn index_of(frame: Option<&Frame>) -> Option<i64> {
    frame.and_then(frame_index_of)
}

// ── Scenario A: sequential playback ────────────────────────────

#[test]
fn sequential_requests_seek_once() {
    let (mut decoder, counters) = decoder(5_000);
    for (t, expected) in [(0, 0), (33, 1), (66, 2)] {
        let outcome = decoder.decode(t);
        assert_eq!(index_of(outcome.frame()), Some(expected));
    }
    let stats = decoder.stats();
    assert_eq!(counters.seeks(), 1);
    assert_eq!(stats.seek_decodes, 1);
    assert_eq!(stats.immediate_decodes + stats.forward_decodes, 2);
    assert_eq!(decoder.state(), DecoderState::Ready);
}

#[test]
fn sequential_renders_then_repeat_hits_cache() {
    let fixture = Fixture::simple();
    let engine = &fixture.engine;

    for (t, expected) in [(0, 0), (33, 1), (66, 2)] {
        let outcome = engine.render(t);
        assert_eq!(outcome.origin(), Some(FrameOrigin::Decoded));
        assert_eq!(index_of(outcome.frame()), Some(expected));
    }
    assert_eq!(fixture.counters().seeks(), 1);
    assert_eq!(fixture.counters().frames_read(), 3);

    let misses = engine.cache_stats().misses;
    let repeat = engine.render(33);
    assert_eq!(repeat.origin(), Some(FrameOrigin::CacheHit));
    assert_eq!(index_of(repeat.frame()), Some(1));
    assert_eq!(engine.cache_stats().misses, misses);
    assert_eq!(fixture.counters().frames_read(), 3);
}

// ── Scenario B: past the end, then back ────────────────────────

#[test]
fn past_end_returns_last_frame_then_recovers() {
    let (mut decoder, counters) = decoder(5_000);

    match decoder.decode(9_999) {
        DecodeOutcome::EndOfStream(frame) => assert_eq!(frame_index_of(&frame), Some(299)),
        other => panic!("expected end of stream, got {:?}", other),
    }
    assert_eq!(decoder.state(), DecoderState::EndOfStream);

    let outcome = decoder.decode(0);
    assert_eq!(index_of(outcome.frame()), Some(0));
    assert_eq!(decoder.state(), DecoderState::Ready);
    assert_eq!(counters.seeks(), 2);
}

#[test]
fn render_past_end_shows_last_frame() {
    let fixture = Fixture::simple();
    let engine = &fixture.engine;

    let end = engine.render(9_999);
    assert_eq!(end.origin(), Some(FrameOrigin::EndOfStream));
    assert_eq!(index_of(end.frame()), Some(299));
    assert_eq!(end.frame().map(|f| f.timestamp_ms), Some(9_999));

    let start = engine.render(0);
    assert_eq!(start.origin(), Some(FrameOrigin::Decoded));
    assert_eq!(index_of(start.frame()), Some(0));
    assert_eq!(fixture.counters().seeks(), 2);
}

// ── Scenario D: byte-budget eviction ───────────────────────────

#[test]
fn eviction_returns_exactly_under_budget() {
    let src = SourceId::new(CLIP);
    let small = Frame::test_pattern(10, 10, 0, 0); // 400 bytes
    let large = Frame::test_pattern(10, 30, 0, 0); // 1200 bytes
    let mut cache = FrameCache::new(100, 2_000);

    for t in 0..5 {
        assert!(cache.put(&src, t, small.clone()));
    }
    assert_eq!(cache.total_bytes(), 2_000);
    assert_eq!(cache.stats().evictions, 0);

    // Touch the oldest entry so it becomes most recently used
    assert!(cache.get(&src, 0).is_some());

    cache.put(&src, 5, small.clone());
    assert_eq!(cache.stats().evictions, 1);
    assert!(!cache.contains(&src, 1));
    assert!(cache.contains(&src, 0));
    assert_eq!(cache.total_bytes(), 2_000);

    // Recency order is now 2, 3, 4, 0, 5; three small frames make room
    cache.put(&src, 6, large);
    assert_eq!(cache.stats().evictions, 4);
    for t in [2, 3, 4] {
        assert!(!cache.contains(&src, t));
    }
    for t in [0, 5, 6] {
        assert!(cache.contains(&src, t));
    }
    assert_eq!(cache.total_bytes(), 2_000);
    assert_eq!(cache.recount_bytes(), cache.total_bytes());
    assert!(cache.len() <= 100);
}

#[test]
fn engine_cache_respects_entry_budget() {
    let mut config = config();
    config.cache.max_entries = 4;
    let fixture = Fixture::new(config, SyntheticSpec::default());
    for i in 0..10 {
        fixture.engine.render(i * 33);
    }
    let stats = fixture.engine.cache_stats();
    assert_eq!(stats.frame_count, 4);
    assert_eq!(stats.total_bytes, 4 * 64 * 36 * 4);
    assert_eq!(stats.evictions, 6);
}

// ── Timeline resolution through the engine ─────────────────────

#[test]
fn trimmed_clip_on_upper_track_wins() {
    let fixture = Fixture::simple();
    let mut timeline = Timeline::new();
    timeline.add_clip(0, Clip::new(CLIP, 1_000, 2_000, 2_000)).unwrap();
    timeline.add_clip(1, Clip::new(CLIP, 0, 10_000, 0)).unwrap();
    fixture.engine.set_timeline(timeline);

    // Upper track, trimmed: 1500 on the timeline is 2500 in the source
    let upper = fixture.engine.render(1_500);
    assert_eq!(index_of(upper.frame()), Some(75));
    assert_eq!(upper.frame().map(|f| f.timestamp_ms), Some(1_500));

    // Lower track shows through outside the upper clip
    let lower = fixture.engine.render(500);
    assert_eq!(index_of(lower.frame()), Some(15));
}

#[test]
fn gap_is_blank_and_leaves_pool_alone() {
    let fixture = Fixture::simple();
    fixture
        .engine
        .set_timeline(Timeline::single_track([Clip::new(CLIP, 1_000, 1_000, 0)]));

    let outcome = fixture.engine.render(0);
    assert_eq!(outcome.origin(), Some(FrameOrigin::Blank));
    let frame = outcome.frame().unwrap();
    assert!(frame.is_blank());
    assert_eq!((frame.width, frame.height), (32, 18));
    assert_eq!(fixture.counters().opens(), 0);
    assert_eq!(fixture.engine.stats().pool.active, 0);
}

// ── Idempotence ────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn second_render_is_a_cache_hit(t in 0i64..9_980) {
        let fixture = Fixture::simple();
        let first = fixture.engine.render(t);
        prop_assert_eq!(first.origin(), Some(FrameOrigin::Decoded));
        let reads = fixture.counters().frames_read();

        let second = fixture.engine.render(t);
        prop_assert_eq!(second.origin(), Some(FrameOrigin::CacheHit));
        prop_assert_eq!(fixture.counters().frames_read(), reads);
        prop_assert!(first.frame().unwrap().shares_pixels(second.frame().unwrap()));
    }
}
