//! The C surface driven the way a host UI would drive it.

use std::ffi::CString;
use std::ptr;

use cutline::{
    cutline_clear_cache, cutline_engine_create, cutline_engine_destroy, cutline_frame_release,
    cutline_get_cache_stats, cutline_render_frame, cutline_set_playback_mode,
    cutline_timeline_add_clip, CUTLINE_ERR_NULL, CUTLINE_FRAME,
};

struct Host {
    engine: *mut cutline::CutlineEngine,
}

impl Host {
    fn open() -> Self {
        let config = CString::new(r#"{ "backend": "synthetic", "prefetch": { "enabled": false } }"#)
            .unwrap();
        let engine = unsafe { cutline_engine_create(config.as_ptr()) };
        assert!(!engine.is_null());
        let path = CString::new("project/a.mov").unwrap();
        for (track, start) in [(0, 0), (0, 10_000)] {
            let code =
                unsafe { cutline_timeline_add_clip(engine, track, path.as_ptr(), start, 10_000, 0) };
            assert_eq!(code, 0);
        }
        Self { engine }
    }

    /// Render and copy the pixels out, releasing the shared buffer.
    fn frame(&self, t: i64) -> Option<(u32, u32, Vec<u8>)> {
        let (mut w, mut h, mut data, mut len) = (0u32, 0u32, ptr::null::<u8>(), 0usize);
        let code = unsafe { cutline_render_frame(self.engine, t, &mut w, &mut h, &mut data, &mut len) };
        if code != CUTLINE_FRAME {
            assert_eq!(code, 0);
            assert!(data.is_null());
            return None;
        }
        let pixels = unsafe { std::slice::from_raw_parts(data, len) }.to_vec();
        assert_eq!(unsafe { cutline_frame_release(data, len) }, 0);
        Some((w, h, pixels))
    }

    fn cache(&self) -> (usize, usize) {
        let (mut count, mut bytes) = (0, 0);
        assert_eq!(unsafe { cutline_get_cache_stats(self.engine, &mut count, &mut bytes) }, 0);
        (count, bytes)
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        unsafe { cutline_engine_destroy(self.engine) };
    }
}

#[test]
fn playback_session_over_the_c_surface() {
    let host = Host::open();
    assert_eq!(unsafe { cutline_set_playback_mode(host.engine, true) }, 0);

    let mut last = None;
    for tick in 0..30 {
        let (w, h, pixels) = host.frame(tick * 33).expect("uncontended render");
        assert_eq!((w, h), (64, 36));
        assert_eq!(pixels.len(), 64 * 36 * 4);
        last = Some(pixels[0]);
    }
    assert_eq!(last, Some(29));
    assert_eq!(host.cache(), (30, 30 * 64 * 36 * 4));

    // The second clip replays the same source from its start
    let (_, _, pixels) = host.frame(10_000).unwrap();
    assert_eq!(pixels[0], 0);

    assert_eq!(unsafe { cutline_set_playback_mode(host.engine, false) }, 0);
    assert_eq!(unsafe { cutline_clear_cache(host.engine) }, 0);
    assert_eq!(host.cache(), (0, 0));
}

#[test]
fn null_handles_are_rejected() {
    assert_eq!(unsafe { cutline_clear_cache(ptr::null()) }, CUTLINE_ERR_NULL);
    assert_eq!(unsafe { cutline_set_playback_mode(ptr::null(), true) }, CUTLINE_ERR_NULL);
    assert_eq!(unsafe { cutline_frame_release(ptr::null(), 0) }, CUTLINE_ERR_NULL);
}
