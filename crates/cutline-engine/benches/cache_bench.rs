//! Benchmarks for the frame cache and the render hot path.
//!
//! Run with: cargo bench -p cutline-engine

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cutline_core::{EngineConfig, Frame, SourceId};
use cutline_engine::{FrameCache, RenderOrchestrator};
use cutline_media::SyntheticOpener;
use cutline_timeline::{Clip, Timeline};

fn bench_cache(c: &mut Criterion) {
    let source = SourceId::new("bench.mp4");
    let frame = Frame::test_pattern(960, 540, 0, 0);

    let mut cache = FrameCache::new(60, 200 * 1024 * 1024);
    for i in 0..60 {
        cache.put(&source, i * 33, frame.restamped(i * 33));
    }
    c.bench_function("cache_get_hit", |bencher| {
        bencher.iter(|| cache.get(black_box(&source), black_box(990)));
    });

    let mut churn = FrameCache::new(60, 200 * 1024 * 1024);
    let mut t = 0i64;
    c.bench_function("cache_put_evicting", |bencher| {
        bencher.iter(|| {
            t += 33;
            churn.put(&source, black_box(t), frame.clone())
        });
    });
}

fn bench_render(c: &mut Criterion) {
    let mut config = EngineConfig::default();
    config.prefetch.enabled = false;
    let engine = RenderOrchestrator::new(config, Arc::new(SyntheticOpener::default()))
        .expect("synthetic engine");
    engine.set_timeline(Timeline::single_track([Clip::new("bench.mp4", 0, 10_000, 0)]));
    engine.render(1_000);

    c.bench_function("render_cache_hit", |bencher| {
        bencher.iter(|| engine.render(black_box(1_000)));
    });

    c.bench_function("render_gap_blank", |bencher| {
        bencher.iter(|| engine.render(black_box(20_000)));
    });
}

criterion_group!(benches, bench_cache, bench_render);
criterion_main!(benches);
