//! Pixel → virtual coordinate mapping.
//!
//! The virtual space spans [-1, 1] on both axes with 0 at the viewport
//! center. The y axis keeps the pixel convention (down is positive); callers
//! flip it where the 3D scene needs y-up.

use crate::types::{DisplaySize, LandmarkPoint};
use serde::{Deserialize, Serialize};

/// Map `coord` in `[0, max]` onto `[-1, 1]`.
///
/// `max == 0` is not trapped: the result is NaN or infinite and flows on
/// to whatever consumes it.
pub fn normalize(coord: f32, max: f32) -> f32 {
    (coord / max) * 2.0 - 1.0
}

/// A landmark expressed in virtual coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub fn from_landmark(point: LandmarkPoint, size: DisplaySize) -> Self {
        Self {
            x: normalize(point.x, size.width as f32),
            y: normalize(point.y, size.height as f32),
        }
    }
}
