//! Quarter-turn image rotations and the point maps between rotated and
//! original pixel frames.
//!
//! Coordinates follow the pixel-centre convention: pixel `(0, 0)` covers
//! `[-0.5, 0.5]²`, so the last column of a `w`-wide image sits at `x = w - 1`.
//! With that convention the maps below are exact inverses of the pixel
//! permutation performed by rotating the buffer.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Counter-clockwise quarter-turn applied to an image before detection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageRotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl ImageRotation {
    /// Fixed precedence in which orientations are tried.
    pub const SEARCH_ORDER: [ImageRotation; 4] = [
        ImageRotation::Deg0,
        ImageRotation::Deg90,
        ImageRotation::Deg180,
        ImageRotation::Deg270,
    ];

    pub fn degrees(self) -> u32 {
        match self {
            ImageRotation::Deg0 => 0,
            ImageRotation::Deg90 => 90,
            ImageRotation::Deg180 => 180,
            ImageRotation::Deg270 => 270,
        }
    }

    /// Size `(width, height)` of an image of size `(w, h)` after rotation.
    pub fn rotated_size(self, w: usize, h: usize) -> (usize, usize) {
        match self {
            ImageRotation::Deg0 | ImageRotation::Deg180 => (w, h),
            ImageRotation::Deg90 | ImageRotation::Deg270 => (h, w),
        }
    }

    /// Map a point of the original `w × h` image into the rotated frame.
    pub fn forward(self, p: Point2<f64>, w: usize, h: usize) -> Point2<f64> {
        let (xm, ym) = last_index(w, h);
        match self {
            ImageRotation::Deg0 => p,
            ImageRotation::Deg90 => Point2::new(p.y, xm - p.x),
            ImageRotation::Deg180 => Point2::new(xm - p.x, ym - p.y),
            ImageRotation::Deg270 => Point2::new(ym - p.y, p.x),
        }
    }

    /// Map a point detected in the rotated frame back into the original
    /// `w × h` image (`w`, `h` are the *original* dimensions).
    pub fn inverse(self, p: Point2<f64>, w: usize, h: usize) -> Point2<f64> {
        let (xm, ym) = last_index(w, h);
        match self {
            ImageRotation::Deg0 => p,
            ImageRotation::Deg90 => Point2::new(xm - p.y, p.x),
            ImageRotation::Deg180 => Point2::new(xm - p.x, ym - p.y),
            ImageRotation::Deg270 => Point2::new(p.y, ym - p.x),
        }
    }
}

#[inline]
fn last_index(w: usize, h: usize) -> (f64, f64) {
    (w.saturating_sub(1) as f64, h.saturating_sub(1) as f64)
}
