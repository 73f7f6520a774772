use std::ffi::c_char;
use std::panic::AssertUnwindSafe;

use cutline_core::{EngineConfig, SourceId};
use cutline_engine::{RenderOrchestrator, RenderOutcome};
use cutline_media::{FfmpegOpener, SourceOpener};
use cutline_timeline::Clip;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::ffi::{self, FrameOut};
use crate::{FfiError, CUTLINE_FRAME, CUTLINE_OK};

/// Opaque engine handle. One per open project.
pub struct CutlineEngine {
    engine: RenderOrchestrator,
}

/// # Safety
///
/// The caller must ensure that engine is null or a live handle from [cutline_engine_create].
unsafe fn engine_ref<'a>(engine: *const CutlineEngine) -> Result<&'a RenderOrchestrator, FfiError> {
    match unsafe { engine.as_ref() } {
        Some(handle) => Ok(&handle.engine),
        None => Err(FfiError::InvalidPointer),
    }
}

/// Initialize logging with a tracing filter such as "info" or "cutline_engine=debug".
///
/// A null or empty level uses `CUTLINE_LOG`, then "info". Calling it again
/// after logging is set up is a no-op.
///
/// # Safety
/// - The caller must ensure that level is null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn cutline_log_init(level: *const c_char) -> i32 {
    ffi::return_code(move || {
        let filter = match unsafe { ffi::parse_str_optional(level) }? {
            Some(level) if !level.is_empty() => EnvFilter::try_new(level)
                .map_err(|e| FfiError::InvalidArgument(format!("log level: {}", e)))?,
            _ => EnvFilter::try_from_env("CUTLINE_LOG")
                .unwrap_or_else(|_| EnvFilter::new("info")),
        };
        let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        Ok(())
    })
}

/// Create an engine from a JSON config. Null selects the defaults.
///
/// Returns null when the config is invalid. Free with [cutline_engine_destroy].
///
/// # Safety
/// - The caller must ensure that config_json is null or a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn cutline_engine_create(config_json: *const c_char) -> *mut CutlineEngine {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| -> Result<*mut CutlineEngine, FfiError> {
        let config = match unsafe { ffi::parse_str_optional(config_json) }? {
            Some(json) => EngineConfig::from_json_str(json)?,
            None => EngineConfig::default(),
        };
        let engine = RenderOrchestrator::from_config(config)?;
        Ok(Box::into_raw(Box::new(CutlineEngine { engine })))
    }));
    match result {
        Ok(Ok(engine)) => engine,
        Ok(Err(e)) => {
            warn!(error = %e, "cannot create engine");
            std::ptr::null_mut()
        }
        Err(_) => std::ptr::null_mut(),
    }
}

/// Destroy an engine. Frames already handed out stay valid until released.
///
/// # Safety
/// - The caller must ensure that engine is null or a handle from [cutline_engine_create]
///   that has not been destroyed, and that no other call is using it.
#[no_mangle]
pub unsafe extern "C" fn cutline_engine_destroy(engine: *mut CutlineEngine) -> i32 {
    ffi::return_code(move || {
        if engine.is_null() {
            return Err(FfiError::InvalidPointer);
        }
        drop(unsafe { Box::from_raw(engine) });
        Ok(())
    })
}

/// Render the frame at `timeline_time_ms`.
///
/// Returns 1 with the out-parameters filled, 0 with them zeroed when there is
/// no frame this call, or a negative code for invalid arguments. A delivered
/// buffer must be returned with [cutline_frame_release].
///
/// # Safety
/// - The caller must ensure that engine is a live handle.
/// - The caller must ensure that every out pointer is valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cutline_render_frame(
    engine: *const CutlineEngine,
    timeline_time_ms: i64,
    out_width: *mut u32,
    out_height: *mut u32,
    out_data: *mut *const u8,
    out_len: *mut usize,
) -> i32 {
    ffi::return_code(move || {
        let engine = unsafe { engine_ref(engine) }?;
        let out = FrameOut {
            width: out_width,
            height: out_height,
            data: out_data,
            len: out_len,
        };
        out.check()?;
        match engine.render(timeline_time_ms) {
            RenderOutcome::Rendered(rendered) => {
                unsafe { out.write(&rendered.frame) };
                Ok(CUTLINE_FRAME)
            }
            RenderOutcome::Skipped => {
                unsafe { out.write_empty() };
                Ok(CUTLINE_OK)
            }
        }
    })
}

/// Return a pixel buffer from [cutline_render_frame] or a thumbnail call.
///
/// # Safety
/// - data and len must be exactly what was handed out, released once.
#[no_mangle]
pub unsafe extern "C" fn cutline_frame_release(data: *const u8, len: usize) -> i32 {
    ffi::return_code(move || {
        if data.is_null() {
            return Err(FfiError::InvalidPointer);
        }
        unsafe { ffi::release_pixels(data, len) };
        Ok(())
    })
}

/// # Safety
/// - The caller must ensure that engine is a live handle.
#[no_mangle]
pub unsafe extern "C" fn cutline_clear_cache(engine: *const CutlineEngine) -> i32 {
    ffi::return_code(move || {
        unsafe { engine_ref(engine) }?.clear_cache();
        Ok(())
    })
}

/// # Safety
/// - The caller must ensure that engine is a live handle.
/// - The caller must ensure that out_count and out_bytes are valid for writes.
#[no_mangle]
pub unsafe extern "C" fn cutline_get_cache_stats(
    engine: *const CutlineEngine,
    out_count: *mut usize,
    out_bytes: *mut usize,
) -> i32 {
    ffi::return_code(move || {
        let engine = unsafe { engine_ref(engine) }?;
        if out_count.is_null() || out_bytes.is_null() {
            return Err(FfiError::InvalidPointer);
        }
        let stats = engine.cache_stats();
        unsafe {
            ffi::write_out(out_count, stats.frame_count)?;
            ffi::write_out(out_bytes, stats.total_bytes)?;
        }
        Ok(())
    })
}

/// Switch between playback (large forward threshold) and scrub policy.
///
/// # Safety
/// - The caller must ensure that engine is a live handle.
#[no_mangle]
pub unsafe extern "C" fn cutline_set_playback_mode(
    engine: *const CutlineEngine,
    is_playing: bool,
) -> i32 {
    ffi::return_code(move || {
        unsafe { engine_ref(engine) }?.set_playback_mode(is_playing);
        Ok(())
    })
}

/// One-shot FFmpeg thumbnail for any file, outside any engine.
///
/// Pass 0 for width or height to keep the aspect ratio. Returns 1 with the
/// out-parameters filled or a negative code.
///
/// # Safety
/// - The caller must ensure that path is a valid null-terminated C string.
/// - The caller must ensure that every out pointer is valid for writes.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn cutline_generate_thumbnail(
    path: *const c_char,
    source_time_ms: i64,
    width: u32,
    height: u32,
    out_width: *mut u32,
    out_height: *mut u32,
    out_data: *mut *const u8,
    out_len: *mut usize,
) -> i32 {
    ffi::return_code(move || {
        let path = unsafe { ffi::parse_str(path) }?;
        let out = FrameOut {
            width: out_width,
            height: out_height,
            data: out_data,
            len: out_len,
        };
        out.check()?;
        let opener = FfmpegOpener::new();
        thumbnail_into(&opener, path, source_time_ms, width, height, &out)
    })
}

/// Thumbnail through the engine's configured backend, still bypassing its
/// decoder pool.
///
/// # Safety
/// - Same as [cutline_generate_thumbnail], and engine must be a live handle.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn cutline_engine_thumbnail(
    engine: *const CutlineEngine,
    path: *const c_char,
    source_time_ms: i64,
    width: u32,
    height: u32,
    out_width: *mut u32,
    out_height: *mut u32,
    out_data: *mut *const u8,
    out_len: *mut usize,
) -> i32 {
    ffi::return_code(move || {
        let engine = unsafe { engine_ref(engine) }?;
        let path = unsafe { ffi::parse_str(path) }?;
        let out = FrameOut {
            width: out_width,
            height: out_height,
            data: out_data,
            len: out_len,
        };
        out.check()?;
        let frame = engine.generate_thumbnail(&SourceId::new(path), source_time_ms, width, height)?;
        unsafe { out.write(&frame) };
        Ok(CUTLINE_FRAME)
    })
}

fn thumbnail_into(
    opener: &dyn SourceOpener,
    path: &str,
    source_time_ms: i64,
    width: u32,
    height: u32,
    out: &FrameOut,
) -> Result<i32, FfiError> {
    let frame = cutline_media::generate_thumbnail(
        opener,
        &SourceId::new(path),
        source_time_ms,
        width,
        height,
    )?;
    unsafe { out.write(&frame) };
    Ok(CUTLINE_FRAME)
}

/// Place a clip on a video track. Missing tracks are created.
///
/// # Safety
/// - The caller must ensure that engine is a live handle.
/// - The caller must ensure that path is a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn cutline_timeline_add_clip(
    engine: *const CutlineEngine,
    track: u32,
    path: *const c_char,
    timeline_start_ms: i64,
    duration_ms: i64,
    trim_offset_ms: i64,
) -> i32 {
    ffi::return_code(move || {
        let engine = unsafe { engine_ref(engine) }?;
        let path = unsafe { ffi::parse_str(path) }?;
        let clip = Clip::new(path, timeline_start_ms, duration_ms, trim_offset_ms);
        engine
            .edit_timeline(|timeline| timeline.add_clip(track as usize, clip))
            .map_err(|e| FfiError::InvalidArgument(e.to_string()))?;
        Ok(())
    })
}

/// Remove every clip.
///
/// # Safety
/// - The caller must ensure that engine is a live handle.
#[no_mangle]
pub unsafe extern "C" fn cutline_timeline_clear(engine: *const CutlineEngine) -> i32 {
    ffi::return_code(move || {
        unsafe { engine_ref(engine) }?.edit_timeline(|timeline| timeline.clear());
        info!("timeline cleared");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CUTLINE_ERR_ARGUMENT, CUTLINE_ERR_ENGINE, CUTLINE_ERR_NULL};
    use std::ffi::CString;
    use std::ptr;

    struct Out {
        width: u32,
        height: u32,
        data: *const u8,
        len: usize,
    }

    impl Out {
        fn new() -> Self {
            Self {
                width: 0,
                height: 0,
                data: ptr::null(),
                len: 0,
            }
        }

        fn pixels(&self) -> &[u8] {
            unsafe { std::slice::from_raw_parts(self.data, self.len) }
        }

        fn release(&mut self) {
            assert_eq!(unsafe { cutline_frame_release(self.data, self.len) }, 0);
            self.data = ptr::null();
        }
    }

    fn synthetic_engine() -> *mut CutlineEngine {
        let config = CString::new(
            r#"{ "backend": "synthetic", "prefetch": { "enabled": false },
                 "output": { "blank_width": 16, "blank_height": 9 } }"#,
        )
        .unwrap();
        let engine = unsafe { cutline_engine_create(config.as_ptr()) };
        assert!(!engine.is_null());
        let path = CString::new("a.mp4").unwrap();
        let code = unsafe { cutline_timeline_add_clip(engine, 0, path.as_ptr(), 0, 10_000, 0) };
        assert_eq!(code, 0);
        engine
    }

    unsafe fn render(engine: *const CutlineEngine, t: i64, out: &mut Out) -> i32 {
        unsafe {
            cutline_render_frame(
                engine,
                t,
                &mut out.width,
                &mut out.height,
                &mut out.data,
                &mut out.len,
            )
        }
    }

    #[test]
    fn render_and_release() {
        let engine = synthetic_engine();
        let mut out = Out::new();
        assert_eq!(unsafe { render(engine, 1_000, &mut out) }, 1);
        assert_eq!((out.width, out.height), (64, 36));
        assert_eq!(out.len, 64 * 36 * 4);
        // Frame 30 is encoded in the first pixel
        assert_eq!(&out.pixels()[..3], &[30, 0, 0]);

        // The buffer outlives the engine until released
        assert_eq!(unsafe { cutline_engine_destroy(engine) }, 0);
        assert_eq!(out.pixels()[0], 30);
        out.release();
    }

    #[test]
    fn cache_stats_and_clear() {
        let engine = synthetic_engine();
        let mut out = Out::new();
        for t in [0, 33, 66] {
            assert_eq!(unsafe { render(engine, t, &mut out) }, 1);
            out.release();
        }
        let (mut count, mut bytes) = (0usize, 0usize);
        assert_eq!(unsafe { cutline_get_cache_stats(engine, &mut count, &mut bytes) }, 0);
        assert_eq!((count, bytes), (3, 3 * 64 * 36 * 4));

        assert_eq!(unsafe { cutline_clear_cache(engine) }, 0);
        assert_eq!(unsafe { cutline_get_cache_stats(engine, &mut count, &mut bytes) }, 0);
        assert_eq!((count, bytes), (0, 0));

        assert_eq!(unsafe { cutline_set_playback_mode(engine, true) }, 0);
        assert_eq!(unsafe { cutline_timeline_clear(engine) }, 0);
        assert_eq!(unsafe { render(engine, 0, &mut out) }, 1);
        assert_eq!((out.width, out.height), (16, 9));
        out.release();
        unsafe { cutline_engine_destroy(engine) };
    }

    #[test]
    fn invalid_arguments() {
        let mut out = Out::new();
        assert_eq!(unsafe { render(ptr::null(), 0, &mut out) }, CUTLINE_ERR_NULL);

        let engine = synthetic_engine();
        let code = unsafe {
            cutline_render_frame(engine, 0, ptr::null_mut(), &mut out.height, &mut out.data, &mut out.len)
        };
        assert_eq!(code, CUTLINE_ERR_NULL);

        let path = CString::new("b.mp4").unwrap();
        let code = unsafe { cutline_timeline_add_clip(engine, 0, path.as_ptr(), 0, 0, 0) };
        assert_eq!(code, CUTLINE_ERR_ARGUMENT);

        let bad = CString::new(r#"{ "cache": { "max_entries": 0 } }"#).unwrap();
        assert!(unsafe { cutline_engine_create(bad.as_ptr()) }.is_null());
        assert_eq!(unsafe { cutline_engine_destroy(ptr::null_mut()) }, CUTLINE_ERR_NULL);
        unsafe { cutline_engine_destroy(engine) };
    }

    #[test]
    fn engine_thumbnail() {
        let engine = synthetic_engine();
        let path = CString::new("a.mp4").unwrap();
        let mut out = Out::new();
        let code = unsafe {
            cutline_engine_thumbnail(
                engine,
                path.as_ptr(),
                2_000,
                32,
                0,
                &mut out.width,
                &mut out.height,
                &mut out.data,
                &mut out.len,
            )
        };
        assert_eq!(code, 1);
        assert_eq!((out.width, out.height), (32, 18));
        out.release();

        let missing = CString::new("/definitely/not/here.mp4").unwrap();
        let code = unsafe {
            cutline_generate_thumbnail(
                missing.as_ptr(),
                0,
                32,
                0,
                &mut out.width,
                &mut out.height,
                &mut out.data,
                &mut out.len,
            )
        };
        assert_eq!(code, CUTLINE_ERR_ENGINE);
        unsafe { cutline_engine_destroy(engine) };
    }
}
