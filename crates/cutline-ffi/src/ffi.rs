use std::ffi::{c_char, CStr};
use std::sync::Arc;

use cutline_core::Frame;

use crate::FfiError;

pub fn return_code<C: ReturnCode, F: FnOnce() -> C>(f: F) -> i32 {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(ret) => ret.code(),
        Err(_) => {
            tracing::error!("panic caught at the ffi boundary");
            FfiError::Panic.code()
        }
    }
}

pub trait ReturnCode {
    fn code(&self) -> i32;
}

impl ReturnCode for () {
    fn code(&self) -> i32 {
        0
    }
}

impl ReturnCode for i32 {
    fn code(&self) -> i32 {
        *self
    }
}

impl ReturnCode for Result<(), FfiError> {
    fn code(&self) -> i32 {
        match self {
            Ok(()) => 0,
            Err(e) => e.code(),
        }
    }
}

impl ReturnCode for Result<i32, FfiError> {
    fn code(&self) -> i32 {
        match self {
            Ok(code) => *code,
            Err(e) => e.code(),
        }
    }
}

/// # Safety
///
/// The caller must ensure that cstr is a valid null-terminated string for 'a.
pub unsafe fn parse_str<'a>(cstr: *const c_char) -> Result<&'a str, FfiError> {
    if cstr.is_null() {
        return Err(FfiError::InvalidPointer);
    }
    let string = unsafe { CStr::from_ptr(cstr) };
    Ok(string.to_str()?)
}

/// Like [`parse_str`] but null means "not given".
///
/// # Safety
///
/// The caller must ensure that cstr is null or a valid null-terminated string for 'a.
pub unsafe fn parse_str_optional<'a>(cstr: *const c_char) -> Result<Option<&'a str>, FfiError> {
    if cstr.is_null() {
        return Ok(None);
    }
    unsafe { parse_str(cstr) }.map(Some)
}

/// # Safety
///
/// The caller must ensure that out is null or valid for writes.
pub unsafe fn write_out<T>(out: *mut T, value: T) -> Result<(), FfiError> {
    if out.is_null() {
        return Err(FfiError::InvalidPointer);
    }
    unsafe { out.write(value) };
    Ok(())
}

/// Out-parameters for a frame handed to the caller.
pub struct FrameOut {
    pub width: *mut u32,
    pub height: *mut u32,
    pub data: *mut *const u8,
    pub len: *mut usize,
}

impl FrameOut {
    pub fn check(&self) -> Result<(), FfiError> {
        if self.width.is_null() || self.height.is_null() || self.data.is_null() || self.len.is_null()
        {
            return Err(FfiError::InvalidPointer);
        }
        Ok(())
    }

    /// Hand out `frame`'s pixels. Ownership of one reference moves to the caller.
    ///
    /// # Safety
    ///
    /// `check` must have passed.
    pub unsafe fn write(&self, frame: &Frame) {
        let pixels: Arc<[u8]> = Arc::clone(&frame.data);
        let len = pixels.len();
        let data = Arc::into_raw(pixels) as *const u8;
        unsafe {
            self.width.write(frame.width);
            self.height.write(frame.height);
            self.data.write(data);
            self.len.write(len);
        }
    }

    /// # Safety
    ///
    /// `check` must have passed.
    pub unsafe fn write_empty(&self) {
        unsafe {
            self.width.write(0);
            self.height.write(0);
            self.data.write(std::ptr::null());
            self.len.write(0);
        }
    }
}

/// Drop the reference taken by [`FrameOut::write`].
///
/// # Safety
///
/// `data` and `len` must come from a single `FrameOut::write` and not have been
/// released before.
pub unsafe fn release_pixels(data: *const u8, len: usize) {
    let slice = std::ptr::slice_from_raw_parts(data, len);
    drop(unsafe { Arc::from_raw(slice) });
}
