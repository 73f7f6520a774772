//! Frame rates and the millisecond frame grid
//!
//! The engine speaks integer milliseconds at every boundary, but frame
//! positions are computed with rational arithmetic so that NTSC rates
//! (30000/1001 and friends) never accumulate floating-point drift.
//! Grid math runs in 128 bits and saturates to the `i64` range, so any
//! input time or index yields an answer.

use num_rational::Ratio;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest time, in milliseconds, a timeline position or source offset may take.
pub const MAX_TIME_MS: i64 = 100 * 366 * 24 * 60 * 60 * 1000;

type GridRatio = Ratio<i128>;

fn saturate(value: i128) -> i64 {
    value.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// Frame rate as a rational number (e.g., 24000/1001 for 23.976 fps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    /// Numerator (e.g., 24000)
    pub numerator: u32,
    /// Denominator (e.g., 1001)
    pub denominator: u32,
}

impl FrameRate {
    /// Create a new frame rate.
    #[inline]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Approximate a floating-point rate, preferring the broadcast rationals.
    pub fn from_fps_f64(fps: f64) -> Self {
        const KNOWN: [FrameRate; 8] = [
            FrameRate::FPS_23_976,
            FrameRate::FPS_24,
            FrameRate::FPS_25,
            FrameRate::FPS_29_97,
            FrameRate::FPS_30,
            FrameRate::FPS_50,
            FrameRate::FPS_59_94,
            FrameRate::FPS_60,
        ];
        if let Some(known) = KNOWN
            .iter()
            .find(|rate| (rate.to_fps_f64() - fps).abs() < 0.005)
        {
            return *known;
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Self::default();
        }
        Self::new((fps * 1000.0).round().max(1.0) as u32, 1000)
    }

    /// Convert to frames per second as f64.
    #[inline]
    pub fn to_fps_f64(self) -> f64 {
        self.numerator as f64 / self.denominator as f64
    }

    /// Whether both terms are non-zero.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.numerator > 0 && self.denominator > 0
    }

    /// Milliseconds per frame as an exact rational.
    #[inline]
    fn ms_per_frame(self) -> GridRatio {
        GridRatio::new(
            1000 * i128::from(self.denominator.max(1)),
            i128::from(self.numerator.max(1)),
        )
    }

    /// Duration of a single frame in milliseconds.
    #[inline]
    pub fn frame_duration_ms(self) -> f64 {
        1000.0 * self.denominator.max(1) as f64 / self.numerator.max(1) as f64
    }

    /// Presentation time of frame `index`, floored to whole milliseconds.
    pub fn frame_to_ms(self, index: i64) -> i64 {
        saturate((self.ms_per_frame() * i128::from(index)).floor().to_integer())
    }

    /// Index of the frame whose presentation time is nearest to `ms`.
    pub fn nearest_frame(self, ms: i64) -> i64 {
        saturate(
            (GridRatio::from_integer(i128::from(ms)) / self.ms_per_frame())
                .round()
                .to_integer(),
        )
    }

    /// Snap a millisecond time onto the frame grid.
    #[inline]
    pub fn snap_ms(self, ms: i64) -> i64 {
        self.frame_to_ms(self.nearest_frame(ms))
    }

    /// Number of whole frames in `duration_ms`.
    pub fn frame_count(self, duration_ms: i64) -> i64 {
        if duration_ms <= 0 {
            return 0;
        }
        saturate(
            (GridRatio::from_integer(i128::from(duration_ms)) / self.ms_per_frame())
                .ceil()
                .to_integer(),
        )
    }

    /// Common frame rates
    pub const FPS_23_976: Self = Self::new(24000, 1001);
    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_25: Self = Self::new(25, 1);
    pub const FPS_29_97: Self = Self::new(30000, 1001);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_50: Self = Self::new(50, 1);
    pub const FPS_59_94: Self = Self::new(60000, 1001);
    pub const FPS_60: Self = Self::new(60, 1);
}

impl Default for FrameRate {
    fn default() -> Self {
        Self::FPS_30
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fps = self.to_fps_f64();
        if (fps - fps.round()).abs() < 0.001 {
            write!(f, "{} fps", fps.round() as u32)
        } else {
            write!(f, "{:.3} fps", fps)
        }
    }
}
