//! Reprojection least-squares problem over shared intrinsics and per-view poses.

use crate::accumulator::CorrespondenceSet;
use calib_camera_core::{CameraModel, Distortion, Intrinsics, ViewPose};
use nalgebra::{DMatrix, DVector, Point2, Point3, Rotation3, Vector3};

/// Dense non-linear least-squares problem `min ‖r(x)‖²`.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;
    fn residuals(&self, x: &DVector<f64>) -> DVector<f64>;

    /// Jacobian `∂r/∂x`; defaults to central differences over every column.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        central_difference_jacobian(self, x)
    }
}

#[inline]
pub(crate) fn fd_step(v: f64) -> f64 {
    1e-6 * v.abs().max(1.0)
}

pub fn central_difference_jacobian<P: NllsProblem + ?Sized>(
    problem: &P,
    x: &DVector<f64>,
) -> DMatrix<f64> {
    let mut jac = DMatrix::zeros(problem.num_residuals(), problem.num_params());
    let mut xp = x.clone();
    for c in 0..x.len() {
        let h = fd_step(x[c]);
        xp[c] = x[c] + h;
        let rp = problem.residuals(&xp);
        xp[c] = x[c] - h;
        let rm = problem.residuals(&xp);
        xp[c] = x[c];
        jac.set_column(c, &((rp - rm) / (2.0 * h)));
    }
    jac
}

/// Number of shared camera parameters: `fx, fy, cx, cy, k1, k2, p1, p2, k3`.
pub const CAMERA_PARAMS: usize = 9;
/// Axis-angle rotation followed by translation.
pub const POSE_PARAMS: usize = 6;

/// Which camera parameters stay at their initial value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CameraParamMask {
    pub fix_k3: bool,
    pub zero_tangent_dist: bool,
}

impl CameraParamMask {
    /// Number of camera parameters left free by this mask.
    pub fn num_free(&self) -> usize {
        self.free_indices().len()
    }

    fn free_indices(&self) -> Vec<usize> {
        (0..CAMERA_PARAMS)
            .filter(|&k| match k {
                6 | 7 => !self.zero_tangent_dist,
                8 => !self.fix_k3,
                _ => true,
            })
            .collect()
    }
}

pub fn camera_to_array(camera: &CameraModel) -> [f64; CAMERA_PARAMS] {
    let k = &camera.intrinsics;
    let d = camera.distortion.to_array();
    [k.fx, k.fy, k.cx, k.cy, d[0], d[1], d[2], d[3], d[4]]
}

pub fn camera_from_array(p: &[f64; CAMERA_PARAMS]) -> CameraModel {
    CameraModel::new(
        Intrinsics {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
        },
        Distortion::from_array([p[4], p[5], p[6], p[7], p[8]]),
    )
}

/// Reprojection residuals `projected - observed` for every corner of every
/// view, two rows per corner, views in order.
///
/// Parameter vector: the free camera parameters, then `(rvec, tvec)` per view.
pub struct PlanarCalibrationProblem<'a> {
    set: &'a CorrespondenceSet,
    fixed: [f64; CAMERA_PARAMS],
    free: Vec<usize>,
    offsets: Vec<usize>,
    num_residuals: usize,
}

impl<'a> PlanarCalibrationProblem<'a> {
    /// `initial` supplies the values of masked parameters.
    pub fn new(set: &'a CorrespondenceSet, initial: &CameraModel, mask: CameraParamMask) -> Self {
        let mut fixed = camera_to_array(initial);
        if mask.zero_tangent_dist {
            fixed[6] = 0.0;
            fixed[7] = 0.0;
        }
        let mut offsets = Vec::with_capacity(set.num_views());
        let mut num_residuals = 0;
        for (_, img) in set.views() {
            offsets.push(num_residuals);
            num_residuals += 2 * img.len();
        }
        Self {
            set,
            fixed,
            free: mask.free_indices(),
            offsets,
            num_residuals,
        }
    }

    pub fn num_camera_params(&self) -> usize {
        self.free.len()
    }

    fn pose_offset(&self, view: usize) -> usize {
        self.free.len() + POSE_PARAMS * view
    }

    pub fn pack(&self, camera: &CameraModel, poses: &[ViewPose]) -> DVector<f64> {
        let all = camera_to_array(camera);
        let mut x = DVector::zeros(self.free.len() + POSE_PARAMS * poses.len());
        for (slot, &k) in self.free.iter().enumerate() {
            x[slot] = all[k];
        }
        for (v, pose) in poses.iter().enumerate() {
            let o = self.pose_offset(v);
            let r = pose.rvec();
            for a in 0..3 {
                x[o + a] = r[a];
                x[o + 3 + a] = pose.translation[a];
            }
        }
        x
    }

    pub fn camera_params(&self, x: &DVector<f64>) -> [f64; CAMERA_PARAMS] {
        let mut p = self.fixed;
        for (slot, &k) in self.free.iter().enumerate() {
            p[k] = x[slot];
        }
        p
    }

    pub fn pose(&self, x: &DVector<f64>, view: usize) -> ViewPose {
        let o = self.pose_offset(view);
        ViewPose::from_rvec_tvec(
            Vector3::new(x[o], x[o + 1], x[o + 2]),
            Vector3::new(x[o + 3], x[o + 4], x[o + 5]),
        )
    }

    pub fn unpack(&self, x: &DVector<f64>) -> (CameraModel, Vec<ViewPose>) {
        let camera = camera_from_array(&self.camera_params(x));
        let poses = (0..self.set.num_views())
            .map(|v| self.pose(x, v))
            .collect();
        (camera, poses)
    }

    fn view_residuals(
        camera: &CameraModel,
        pose: &ViewPose,
        obj: &[Point3<f64>],
        img: &[Point2<f64>],
        out: &mut [f64],
    ) {
        for (k, (p, uv)) in obj.iter().zip(img).enumerate() {
            let (ex, ey) = match camera.project(pose, p) {
                Some(q) => (q.x - uv.x, q.y - uv.y),
                None => (f64::INFINITY, f64::INFINITY),
            };
            out[2 * k] = ex;
            out[2 * k + 1] = ey;
        }
    }

    fn pose_from_slice(s: &[f64]) -> ViewPose {
        ViewPose::new(
            Rotation3::from_scaled_axis(Vector3::new(s[0], s[1], s[2])),
            Vector3::new(s[3], s[4], s[5]),
        )
    }
}

impl NllsProblem for PlanarCalibrationProblem<'_> {
    fn num_params(&self) -> usize {
        self.free.len() + POSE_PARAMS * self.set.num_views()
    }

    fn num_residuals(&self) -> usize {
        self.num_residuals
    }

    fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let camera = camera_from_array(&self.camera_params(x));
        let mut r = DVector::zeros(self.num_residuals);
        for (v, (obj, img)) in self.set.views().enumerate() {
            let pose = self.pose(x, v);
            let o = self.offsets[v];
            Self::view_residuals(
                &camera,
                &pose,
                obj,
                img,
                &mut r.as_mut_slice()[o..o + 2 * img.len()],
            );
        }
        r
    }

    /// Central differences exploiting the block structure: a pose column
    /// only touches the rows of its own view.
    fn jacobian(&self, x: &DVector<f64>) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.num_residuals, self.num_params());
        let mut xp = x.clone();

        for c in 0..self.free.len() {
            let h = fd_step(x[c]);
            xp[c] = x[c] + h;
            let rp = self.residuals(&xp);
            xp[c] = x[c] - h;
            let rm = self.residuals(&xp);
            xp[c] = x[c];
            jac.set_column(c, &((rp - rm) / (2.0 * h)));
        }

        let camera = camera_from_array(&self.camera_params(x));
        for (v, (obj, img)) in self.set.views().enumerate() {
            let o = self.pose_offset(v);
            let rows = self.offsets[v];
            let n = 2 * img.len();
            let mut block = x.as_slice()[o..o + POSE_PARAMS].to_vec();
            let mut rp = vec![0.0; n];
            let mut rm = vec![0.0; n];

            for a in 0..POSE_PARAMS {
                let base = block[a];
                let h = fd_step(base);
                block[a] = base + h;
                Self::view_residuals(&camera, &Self::pose_from_slice(&block), obj, img, &mut rp);
                block[a] = base - h;
                Self::view_residuals(&camera, &Self::pose_from_slice(&block), obj, img, &mut rm);
                block[a] = base;
                for row in 0..n {
                    jac[(rows + row, o + a)] = (rp[row] - rm[row]) / (2.0 * h);
                }
            }
        }
        jac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_camera_core::synthetic::{orbit_poses, project_view};
    use calib_camera_core::PatternGeometry;

    fn camera() -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx: 800.0,
                fy: 790.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion {
                k1: -0.1,
                k2: 0.02,
                p1: 0.001,
                p2: -0.0005,
                k3: 0.0,
            },
        )
    }

    fn scene() -> (CorrespondenceSet, Vec<ViewPose>) {
        let geometry = PatternGeometry::new(5, 4, 2.0).unwrap();
        let grid = geometry.object_points();
        let poses = orbit_poses(&geometry, 3, 40.0, 0.3);
        let mut set = CorrespondenceSet::new();
        for pose in &poses {
            set.push(grid.clone(), project_view(&camera(), pose, &grid).unwrap())
                .unwrap();
        }
        (set, poses)
    }

    #[test]
    fn residuals_vanish_at_ground_truth() {
        let (set, poses) = scene();
        let problem = PlanarCalibrationProblem::new(&set, &camera(), CameraParamMask::default());
        assert_eq!(problem.num_params(), 9 + 18);
        assert_eq!(problem.num_residuals(), 3 * 40);

        let x = problem.pack(&camera(), &poses);
        assert!(problem.residuals(&x).amax() < 1e-9);

        let (cam, back) = problem.unpack(&x);
        assert_eq!(camera_to_array(&cam), camera_to_array(&camera()));
        assert!((back[1].translation - poses[1].translation).norm() < 1e-12);
    }

    #[test]
    fn block_jacobian_matches_dense_differences() {
        let (set, poses) = scene();
        let problem = PlanarCalibrationProblem::new(&set, &camera(), CameraParamMask::default());
        let mut x = problem.pack(&camera(), &poses);
        x[0] += 3.0;
        x[12] += 0.01;

        let block = problem.jacobian(&x);
        let dense = central_difference_jacobian(&problem, &x);
        assert!((block - dense).amax() < 1e-6);
    }

    #[test]
    fn masked_parameters_keep_their_values() {
        let (set, poses) = scene();
        let mask = CameraParamMask {
            fix_k3: true,
            zero_tangent_dist: true,
        };
        let mut initial = camera();
        initial.distortion.k3 = 0.25;
        let problem = PlanarCalibrationProblem::new(&set, &initial, mask);
        assert_eq!(problem.num_camera_params(), 6);

        let x = problem.pack(&initial, &poses);
        let p = problem.camera_params(&x);
        assert_eq!(p[6], 0.0);
        assert_eq!(p[7], 0.0);
        assert_eq!(p[8], 0.25);
    }
}
