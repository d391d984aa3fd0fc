//! Planar camera calibration from chessboard correspondences.
//!
//! - [`CorrespondenceAccumulator`] collects per-view corner sets against the
//!   shared object grid.
//! - [`CalibrationSolver`] validates the batch and runs a
//!   [`CalibrationBackend`]; the default backend initialises from plane
//!   homographies and refines everything with Levenberg-Marquardt.
//! - [`PoseEstimator`] and [`UnitConverter`] turn a result into a camera
//!   position and physical focal lengths.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_camera_core::{CornerSet, ImageSize, PatternGeometry};
//! use calib_camera_solver::{
//!     CalibrationSolver, CorrespondenceAccumulator, PoseEstimator, SolverOptions,
//! };
//!
//! # fn corner_sets() -> Vec<CornerSet> { Vec::new() }
//! let geometry = PatternGeometry::new(9, 6, 2.0)?;
//! let mut acc = CorrespondenceAccumulator::new(geometry.object_points());
//! for (index, corners) in corner_sets().into_iter().enumerate() {
//!     acc.push(index, corners)?;
//! }
//!
//! let solver = CalibrationSolver::new(SolverOptions::default());
//! let result = solver.calibrate(acc.correspondences(), ImageSize::new(640, 480))?;
//! let placement = PoseEstimator::for_view(&result, 0)?;
//! println!("rms {:.3} px, distance {:.2}", result.reprojection_error, placement.distance);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod accumulator;
mod backend_lm;
mod error;
pub mod init;
mod pose;
mod problem;
mod result;
mod solver;
mod units;

pub use accumulator::{CorrespondenceAccumulator, CorrespondenceSet, ViewFailure};
pub use backend_lm::{solve_lm, LmOptions, SolveReport};
pub use error::{AccumulateError, CalibrationError};
pub use pose::{CameraPlacement, PoseError, PoseEstimator};
pub use problem::{
    camera_from_array, camera_to_array, central_difference_jacobian, CameraParamMask,
    NllsProblem, PlanarCalibrationProblem, CAMERA_PARAMS, POSE_PARAMS,
};
pub use result::{reprojection_errors, CalibrationResult};
pub use solver::{
    CalibrationBackend, CalibrationSolver, LmCalibrationBackend, SolverOptions,
    MIN_POINTS_PER_VIEW,
};
pub use units::{PhysicalIntrinsics, SensorError, SensorGeometry, UnitConverter};
