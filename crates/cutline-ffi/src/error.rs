use cutline_core::CutlineError;

/// Failures reported across the C boundary as negative codes.
#[derive(Debug, thiserror::Error)]
pub enum FfiError {
    #[error("null pointer")]
    InvalidPointer,

    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("engine error: {0}")]
    Engine(#[from] CutlineError),

    #[error("panic")]
    Panic,
}

pub const CUTLINE_OK: i32 = 0;
pub const CUTLINE_FRAME: i32 = 1;
pub const CUTLINE_ERR_NULL: i32 = -1;
pub const CUTLINE_ERR_UTF8: i32 = -2;
pub const CUTLINE_ERR_ARGUMENT: i32 = -3;
pub const CUTLINE_ERR_ENGINE: i32 = -4;
pub const CUTLINE_ERR_PANIC: i32 = -5;

impl FfiError {
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidPointer => CUTLINE_ERR_NULL,
            Self::InvalidUtf8(_) => CUTLINE_ERR_UTF8,
            Self::InvalidArgument(_) => CUTLINE_ERR_ARGUMENT,
            Self::Engine(_) => CUTLINE_ERR_ENGINE,
            Self::Panic => CUTLINE_ERR_PANIC,
        }
    }
}
