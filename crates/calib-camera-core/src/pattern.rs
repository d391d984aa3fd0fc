//! Calibration target geometry and the per-view point sets derived from it.

use crate::ImageRotation;
use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Target geometry validation errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("corner counts must be >= 2 (got {corners_x}x{corners_y})")]
    TooFewCorners { corners_x: u32, corners_y: u32 },
    #[error("cell_size must be finite and > 0 (got {0})")]
    InvalidCellSize(f64),
}

/// Checkerboard description: inner-corner counts and the physical cell size.
///
/// `cell_size` is in whatever length unit the caller chooses; object points,
/// translations and camera distances come out in that same unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternGeometry {
    pub corners_x: u32,
    pub corners_y: u32,
    pub cell_size: f64,
}

impl PatternGeometry {
    pub fn new(corners_x: u32, corners_y: u32, cell_size: f64) -> Result<Self, PatternError> {
        let geometry = Self {
            corners_x,
            corners_y,
            cell_size,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<(), PatternError> {
        if self.corners_x < 2 || self.corners_y < 2 {
            return Err(PatternError::TooFewCorners {
                corners_x: self.corners_x,
                corners_y: self.corners_y,
            });
        }
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(PatternError::InvalidCellSize(self.cell_size));
        }
        Ok(())
    }

    /// Number of inner corners on the board.
    #[inline]
    pub fn corner_count(&self) -> usize {
        self.corners_x as usize * self.corners_y as usize
    }

    /// Canonical index of grid corner `(i, j)`: x runs fastest.
    #[inline]
    pub fn index_of(&self, i: u32, j: u32) -> usize {
        j as usize * self.corners_x as usize + i as usize
    }

    /// Build the canonical object point grid for this geometry.
    pub fn object_points(&self) -> ObjectPointGrid {
        ObjectPointGrid::new(self)
    }
}

/// Board-frame corner coordinates on the `z = 0` plane.
///
/// Cloning is cheap: every view shares the same backing buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectPointGrid {
    points: Arc<[Point3<f64>]>,
}

impl ObjectPointGrid {
    pub fn new(geometry: &PatternGeometry) -> Self {
        let mut points = Vec::with_capacity(geometry.corner_count());
        for j in 0..geometry.corners_y {
            for i in 0..geometry.corners_x {
                points.push(Point3::new(
                    i as f64 * geometry.cell_size,
                    j as f64 * geometry.cell_size,
                    0.0,
                ));
            }
        }
        Self {
            points: points.into(),
        }
    }

    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True when both handles share one buffer.
    pub fn shares_storage_with(&self, other: &ObjectPointGrid) -> bool {
        Arc::ptr_eq(&self.points, &other.points)
    }
}

/// Refined image corners of one view, index-aligned with [`ObjectPointGrid`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    pub points: Vec<Point2<f64>>,
    /// Orientation at which the pattern was found.
    pub rotation: ImageRotation,
    /// Size `(width, height)` of the image the corners were measured in.
    pub image_size: (u32, u32),
}

impl CornerSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_geometry() {
        assert_eq!(
            PatternGeometry::new(1, 6, 2.0),
            Err(PatternError::TooFewCorners {
                corners_x: 1,
                corners_y: 6
            })
        );
        assert!(matches!(
            PatternGeometry::new(9, 6, 0.0),
            Err(PatternError::InvalidCellSize(_))
        ));
        assert!(matches!(
            PatternGeometry::new(9, 6, f64::NAN),
            Err(PatternError::InvalidCellSize(_))
        ));
        assert!(PatternGeometry::new(2, 2, 1.0).is_ok());
    }

    #[test]
    fn object_points_are_row_major_with_x_fastest() {
        let geometry = PatternGeometry::new(3, 2, 2.5).unwrap();
        let grid = geometry.object_points();
        assert_eq!(grid.len(), 6);
        assert_eq!(grid.points()[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(grid.points()[1], Point3::new(2.5, 0.0, 0.0));
        assert_eq!(grid.points()[2], Point3::new(5.0, 0.0, 0.0));
        assert_eq!(grid.points()[3], Point3::new(0.0, 2.5, 0.0));
        assert_eq!(grid.points()[geometry.index_of(2, 1)], Point3::new(5.0, 2.5, 0.0));
        assert!(grid.points().iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn clones_share_storage() {
        let grid = PatternGeometry::new(9, 6, 2.0).unwrap().object_points();
        let copy = grid.clone();
        assert!(copy.shares_storage_with(&grid));
        let rebuilt = PatternGeometry::new(9, 6, 2.0).unwrap().object_points();
        assert_eq!(rebuilt, grid);
        assert!(!rebuilt.shares_storage_with(&grid));
    }
}
