use crate::accumulator::CorrespondenceSet;
use calib_camera_core::{CameraModel, ImageSize, ViewPose};
use serde::{Deserialize, Serialize};

/// Outcome of a successful calibration.
///
/// `poses` and `per_view_errors` are index-aligned with the views of the
/// [`CorrespondenceSet`] that was solved.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub camera: CameraModel,
    pub poses: Vec<ViewPose>,
    /// RMS reprojection error over every corner of every view, in pixels.
    pub reprojection_error: f64,
    /// RMS reprojection error of each view, in pixels.
    pub per_view_errors: Vec<f64>,
    pub image_size: ImageSize,
    /// Residual evaluations spent by the optimizer.
    pub evaluations: usize,
    /// Why the optimizer stopped.
    pub termination: String,
}

impl CalibrationResult {
    pub fn num_views(&self) -> usize {
        self.poses.len()
    }
}

/// Overall and per-view RMS of the pixel distance between projected and
/// observed corners. `None` when some point projects behind the camera.
pub fn reprojection_errors(
    camera: &CameraModel,
    poses: &[ViewPose],
    set: &CorrespondenceSet,
) -> Option<(f64, Vec<f64>)> {
    let mut total_sq = 0.0;
    let mut total_n = 0usize;
    let mut per_view = Vec::with_capacity(poses.len());

    for (pose, (obj, img)) in poses.iter().zip(set.views()) {
        let mut sq = 0.0;
        for (p, uv) in obj.iter().zip(img) {
            sq += (camera.project(pose, p)? - uv).norm_squared();
        }
        total_sq += sq;
        total_n += img.len();
        per_view.push((sq / img.len().max(1) as f64).sqrt());
    }

    Some(((total_sq / total_n.max(1) as f64).sqrt(), per_view))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_camera_core::synthetic::{orbit_poses, project_view};
    use calib_camera_core::{Distortion, Intrinsics, PatternGeometry};
    use nalgebra::Vector2;

    #[test]
    fn rms_reflects_a_constant_offset() {
        let camera = CameraModel::new(
            Intrinsics {
                fx: 700.0,
                fy: 700.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion::default(),
        );
        let geometry = PatternGeometry::new(4, 3, 1.0).unwrap();
        let grid = geometry.object_points();
        let poses = orbit_poses(&geometry, 2, 20.0, 0.2);

        let mut set = CorrespondenceSet::new();
        let exact = project_view(&camera, &poses[0], &grid).unwrap();
        set.push(grid.clone(), exact).unwrap();
        let shifted = project_view(&camera, &poses[1], &grid)
            .unwrap()
            .into_iter()
            .map(|p| p + Vector2::new(3.0, 4.0))
            .collect();
        set.push(grid, shifted).unwrap();

        let (rms, per_view) = reprojection_errors(&camera, &poses, &set).unwrap();
        assert!(per_view[0] < 1e-9);
        assert!((per_view[1] - 5.0).abs() < 1e-9);
        assert!((rms - (12.5f64).sqrt()).abs() < 1e-9);
    }
}
