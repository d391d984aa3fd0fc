use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Candidate X-corner produced by a corner front end, before grid assembly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Corner {
    /// Corner position in pixel coordinates.
    pub position: Point2<f32>,

    /// Strength / response of the corner detector.
    pub strength: f32,
}

impl Corner {
    pub fn new(x: f32, y: f32, strength: f32) -> Self {
        Self {
            position: Point2::new(x, y),
            strength,
        }
    }
}

/// Integer grid coordinates (i, j) in board space; `i` runs along the
/// pattern's x axis (columns), `j` along its y axis (rows).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct GridCoords {
    pub i: i32,
    pub j: i32,
}
