use crate::gridgraph::{assemble_grid, GridError};
use crate::params::ChessboardParams;
use crate::source::{ChessCornerSource, CornerSource};
use crate::subpix::refine_corners;
use calib_camera_core::{
    Corner, CornerSet, GrayImageView, ImageRotation, PatternError, PatternGeometry,
};
use image::imageops;
use nalgebra::Point2;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Per-image detection failures. None of them aborts a batch.
#[derive(thiserror::Error, Debug)]
pub enum DetectError {
    #[error("chessboard with {corners_x}x{corners_y} inner corners not found at any orientation")]
    PatternNotFound { corners_x: u32, corners_y: u32 },

    #[error("failed to read image {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(
        "image {path} is {width}x{height}, expected {expected_width}x{expected_height} like the first view"
    )]
    ResolutionMismatch {
        path: PathBuf,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
}

/// Decode an image file and convert it to 8-bit grayscale.
pub fn load_gray(path: &Path) -> Result<image::GrayImage, DetectError> {
    image::open(path)
        .map(|img| img.to_luma8())
        .map_err(|source| DetectError::Unreadable {
            path: path.to_path_buf(),
            source,
        })
}

/// Borrow an `image::GrayImage` as the lightweight core view type.
pub fn gray_view(img: &image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Rotate `img` counter-clockwise by `rotation`; `Deg0` borrows the input.
pub fn rotate_image(img: &image::GrayImage, rotation: ImageRotation) -> Cow<'_, image::GrayImage> {
    match rotation {
        ImageRotation::Deg0 => Cow::Borrowed(img),
        ImageRotation::Deg90 => Cow::Owned(imageops::rotate270(img)),
        ImageRotation::Deg180 => Cow::Owned(imageops::rotate180(img)),
        ImageRotation::Deg270 => Cow::Owned(imageops::rotate90(img)),
    }
}

/// Chessboard detector: ChESS candidates, grid assembly under a quarter-turn
/// search, then sub-pixel refinement in the original image.
pub struct ChessboardDetector<S = ChessCornerSource> {
    geometry: PatternGeometry,
    params: ChessboardParams,
    source: S,
}

impl ChessboardDetector<ChessCornerSource> {
    pub fn new(geometry: PatternGeometry, params: ChessboardParams) -> Result<Self, PatternError> {
        let source = ChessCornerSource::new(&params);
        Self::with_source(geometry, params, source)
    }
}

impl<S: CornerSource> ChessboardDetector<S> {
    pub fn with_source(
        geometry: PatternGeometry,
        params: ChessboardParams,
        source: S,
    ) -> Result<Self, PatternError> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            params,
            source,
        })
    }

    pub fn geometry(&self) -> &PatternGeometry {
        &self.geometry
    }

    pub fn params(&self) -> &ChessboardParams {
        &self.params
    }

    /// Find the board in `img` and return its corners in canonical order,
    /// expressed in `img`'s own pixel frame.
    ///
    /// Orientations are tried in [`ImageRotation::SEARCH_ORDER`]; the first
    /// one that yields a complete grid wins.
    #[cfg_attr(
        feature = "tracing",
        instrument(
            level = "info",
            skip(self, img),
            fields(width = img.width(), height = img.height())
        )
    )]
    pub fn detect(&self, img: &image::GrayImage) -> Result<CornerSet, DetectError> {
        let (w, h) = (img.width() as usize, img.height() as usize);

        for rotation in ImageRotation::SEARCH_ORDER {
            let rotated = rotate_image(img, rotation);
            let corners: Vec<Corner> = self
                .source
                .detect(&rotated)
                .into_iter()
                .filter(|c| c.strength >= self.params.min_strength)
                .collect();

            match self.detect_from_corners(&corners) {
                Ok(points) => {
                    let mut points: Vec<Point2<f64>> = points
                        .into_iter()
                        .map(|p| rotation.inverse(p, w, h))
                        .collect();
                    refine_corners(&gray_view(img), &mut points, &self.params.subpix);
                    log::debug!(
                        "chessboard found at {}° from {} candidates",
                        rotation.degrees(),
                        corners.len()
                    );
                    return Ok(CornerSet {
                        points,
                        rotation,
                        image_size: (img.width(), img.height()),
                    });
                }
                Err(err) => {
                    log::debug!(
                        "no chessboard at {}° ({} candidates): {err}",
                        rotation.degrees(),
                        corners.len()
                    );
                }
            }
        }

        Err(DetectError::PatternNotFound {
            corners_x: self.geometry.corners_x,
            corners_y: self.geometry.corners_y,
        })
    }

    /// Assemble the configured grid from corner candidates; positions stay
    /// in the candidates' frame and are not refined.
    pub fn detect_from_corners(&self, corners: &[Corner]) -> Result<Vec<Point2<f64>>, GridError> {
        let found = assemble_grid(
            corners,
            self.geometry.corners_x,
            self.geometry.corners_y,
            &self.params.graph,
        )?;
        Ok(found
            .corner_indices
            .iter()
            .map(|&k| corners[k].position.cast::<f64>())
            .collect())
    }
}
