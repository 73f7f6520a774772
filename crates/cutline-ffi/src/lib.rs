//! Cutline FFI - the C-compatible call boundary
//!
//! Everything crosses as plain data: an opaque engine handle, integers, and
//! pointer/length pairs. Pixel buffers are handed out without copying and
//! must be returned with [`cutline_frame_release`].
//!
//! Return codes: `1` frame delivered, `0` success or "no frame this call",
//! negative values are [`FfiError`] codes.

#![allow(unsafe_code)]

mod api;
mod error;
mod ffi;

pub use api::*;
pub use error::*;
