//! Core types for planar chessboard camera calibration.
//!
//! Purely geometric: target layout, camera model, quarter-turn rotations,
//! plane homographies and a grayscale view for sampling. Nothing here depends
//! on a concrete corner detector or optimizer.

mod camera;
mod corner;
mod homography;
mod image;
mod logger;
mod pattern;
mod rotation;
pub mod synthetic;

pub use camera::{CameraModel, Distortion, ImageSize, Intrinsics, ViewPose};
pub use corner::{Corner, GridCoords};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{sample_bilinear, GrayImage, GrayImageView};
pub use pattern::{CornerSet, ObjectPointGrid, PatternError, PatternGeometry};
pub use rotation::ImageRotation;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_from_verbosity};
