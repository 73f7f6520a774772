//! Cutline - headless decode/cache/playback engine front end.

mod cli;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use cutline_core::{Backend, EngineConfig, SourceId};
use cutline_engine::{FrameOrigin, PlaybackDriver, RenderOrchestrator, RenderedFrame};
use cutline_media::{generate_thumbnail, opener_for, MediaProbe, SourceOpener};
use cutline_timeline::{Clip, Timeline};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cli::{Args, Command};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_env("CUTLINE_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    match args.command {
        Command::Play {
            files,
            seconds,
            from_ms,
        } => play(config, &files, seconds, from_ms),
        Command::Thumb {
            file,
            at_ms,
            width,
            height,
            output,
        } => thumb(&config, &file, at_ms, width, height, &output),
        Command::Probe { file } => {
            let probe = MediaProbe::probe(&file)?;
            println!("{}", serde_json::to_string_pretty(&probe)?);
            Ok(())
        }
        Command::Config => {
            println!("{}", config.to_json_string()?);
            Ok(())
        }
    }
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if args.synthetic {
        config.backend = Backend::Synthetic;
    }
    Ok(config)
}

fn source_id(path: &Path) -> SourceId {
    SourceId::new(path.to_string_lossy())
}

/// Lay the files out back to back, using each stream's own duration.
fn build_timeline(opener: &dyn SourceOpener, files: &[std::path::PathBuf]) -> Result<Timeline> {
    let mut timeline = Timeline::new();
    let mut cursor = 0;
    for file in files {
        let id = source_id(file);
        let duration_ms = opener
            .open(&id)
            .with_context(|| format!("opening {}", file.display()))?
            .info()
            .duration_ms;
        if duration_ms <= 0 {
            warn!(path = %file.display(), "source has no duration, skipping");
            continue;
        }
        timeline.add_clip(0, Clip::new(id, cursor, duration_ms, 0))?;
        cursor += duration_ms;
    }
    if timeline.duration_ms() == 0 {
        bail!("nothing to play");
    }
    Ok(timeline)
}

fn play(config: EngineConfig, files: &[std::path::PathBuf], seconds: f64, from_ms: i64) -> Result<()> {
    let opener = opener_for(&config);
    let timeline = build_timeline(opener.as_ref(), files)?;
    let duration_ms = timeline.duration_ms();

    let engine = Arc::new(RenderOrchestrator::new(config, opener)?);
    engine.set_timeline(timeline);

    let origins: Arc<Mutex<BTreeMap<String, u64>>> = Arc::default();
    let sink_origins = Arc::clone(&origins);
    let driver = PlaybackDriver::spawn(Arc::clone(&engine), move |frame: &RenderedFrame, _: i64| {
        let key = match frame.origin {
            FrameOrigin::Decoded => "decoded",
            FrameOrigin::CacheHit => "cache_hit",
            FrameOrigin::EndOfStream => "end_of_stream",
            FrameOrigin::Fallback => "fallback",
            FrameOrigin::Blank => "blank",
        };
        *sink_origins.lock().entry(key.to_string()).or_default() += 1;
    })?;

    info!(duration_ms, from_ms, seconds, "starting playback");
    let started = Instant::now();
    driver.seek(from_ms);
    driver.play();

    let limit = Duration::from_secs_f64(seconds.max(0.0));
    // Give the clock a moment to pick up Play before polling its state
    std::thread::sleep(Duration::from_millis(50).min(limit));
    while started.elapsed() < limit && driver.is_playing() {
        std::thread::sleep(Duration::from_millis(50));
    }
    driver.pause();
    let status = driver.status();
    drop(driver);

    let report = serde_json::json!({
        "elapsed_ms": started.elapsed().as_millis() as u64,
        "playback": status,
        "origins": origins.lock().clone(),
        "engine": engine.stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn thumb(
    config: &EngineConfig,
    file: &Path,
    at_ms: i64,
    width: u32,
    height: u32,
    output: &Path,
) -> Result<()> {
    let opener = opener_for(config);
    let frame = generate_thumbnail(opener.as_ref(), &source_id(file), at_ms, width, height)?;
    let image = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
        .context("thumbnail buffer size mismatch")?;
    image
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    info!(
        path = %output.display(),
        width = frame.width,
        height = frame.height,
        "thumbnail written"
    );
    Ok(())
}
