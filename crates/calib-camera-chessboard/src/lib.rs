//! Chessboard corner extraction for camera calibration.
//!
//! Pipeline per image:
//! 1. ChESS X-corner candidates ([`CornerSource`]),
//! 2. grid assembly over a k-d tree neighbourhood graph ([`assemble_grid`]),
//!    retried at 0°, 90°, 180° and 270° until the configured grid appears,
//! 3. mapping back to the original frame and iterative gradient sub-pixel
//!    refinement ([`refine_corners`]).

mod detector;
mod gridgraph;
mod params;
mod source;
mod subpix;

pub use detector::{gray_view, load_gray, rotate_image, ChessboardDetector, DetectError};
pub use gridgraph::{
    assemble_grid, assign_grid_coordinates, connected_components, GridError, GridGraph, GridMatch,
    NeighborDirection, NodeNeighbor,
};
pub use params::{ChessboardParams, GridGraphParams, SubpixParams};
pub use source::{ChessCornerSource, CornerSource};
pub use subpix::{refine_corner, refine_corners};
