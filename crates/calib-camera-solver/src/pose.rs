//! Camera placement relative to the board.

use crate::result::CalibrationResult;
use calib_camera_core::ViewPose;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PoseError {
    #[error("reference view {index} out of range ({num_views} views)")]
    ViewOutOfRange { index: usize, num_views: usize },
}

/// Camera centre in board coordinates, in the board's length unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPlacement {
    pub position: Vector3<f64>,
    /// Distance from the board origin to the camera centre.
    pub distance: f64,
}

/// Inverts a view pose into the camera's position on the board frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct PoseEstimator;

impl PoseEstimator {
    /// `position = -Rᵀ t`, `distance = ‖position‖`.
    pub fn placement(pose: &ViewPose) -> CameraPlacement {
        let position = -(pose.rotation.inverse() * pose.translation);
        CameraPlacement {
            position,
            distance: position.norm(),
        }
    }

    /// Placement of the camera in view `index` of a calibration.
    pub fn for_view(result: &CalibrationResult, index: usize) -> Result<CameraPlacement, PoseError> {
        result
            .poses
            .get(index)
            .map(Self::placement)
            .ok_or(PoseError::ViewOutOfRange {
                index,
                num_views: result.poses.len(),
            })
    }
}
