//! Pinhole camera with Brown–Conrady lens distortion.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Image resolution in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Geometric image centre in pixel-centre coordinates.
    pub fn center(&self) -> Point2<f64> {
        Point2::new(
            (self.width as f64 - 1.0) * 0.5,
            (self.height as f64 - 1.0) * 0.5,
        )
    }
}

/// Zero-skew pinhole intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl Intrinsics {
    /// Upper-triangular camera matrix `K`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Read `fx, fy, cx, cy` from a camera matrix; skew is dropped.
    pub fn from_matrix(k: &Matrix3<f64>) -> Self {
        Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.fx.is_finite() && self.fy.is_finite() && self.cx.is_finite() && self.cy.is_finite()
    }
}

/// Radial (k1, k2, k3) + tangential (p1, p2) polynomial distortion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl Distortion {
    pub const LEN: usize = 5;

    /// Coefficients in the conventional `(k1, k2, p1, p2, k3)` order.
    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn from_array(c: [f64; 5]) -> Self {
        Self {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c[4],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|c| c.is_finite())
    }

    /// Distort a point on the normalized image plane.
    #[inline]
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;

        let xy = x * y;
        let x_tan = 2.0 * self.p1 * xy + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * xy;

        (x * radial + x_tan, y * radial + y_tan)
    }
}

/// Rigid transform taking board coordinates into the camera frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewPose {
    pub rotation: Rotation3<f64>,
    pub translation: Vector3<f64>,
}

impl ViewPose {
    pub fn new(rotation: Rotation3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Build from an axis-angle (Rodrigues) vector and a translation.
    pub fn from_rvec_tvec(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self::new(Rotation3::from_scaled_axis(rvec), tvec)
    }

    /// Minimal axis-angle encoding of the rotation.
    pub fn rvec(&self) -> Vector3<f64> {
        self.rotation.scaled_axis()
    }

    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation * p + self.translation
    }

    pub fn is_finite(&self) -> bool {
        self.rotation.matrix().iter().all(|v| v.is_finite())
            && self.translation.iter().all(|v| v.is_finite())
    }
}

/// Intrinsics plus distortion; immutable once produced by a solve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(intrinsics: Intrinsics, distortion: Distortion) -> Self {
        Self {
            intrinsics,
            distortion,
        }
    }

    /// Camera matrix `K`.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        self.intrinsics.matrix()
    }

    /// Project a camera-frame point to pixels; `None` behind the camera.
    pub fn project_camera_point(&self, pc: &Point3<f64>) -> Option<Point2<f64>> {
        if pc.z <= f64::EPSILON {
            return None;
        }
        let (xd, yd) = self.distortion.distort(pc.x / pc.z, pc.y / pc.z);
        let k = &self.intrinsics;
        Some(Point2::new(k.fx * xd + k.cx, k.fy * yd + k.cy))
    }

    /// Project a board-frame point seen under `pose`.
    pub fn project(&self, pose: &ViewPose, p: &Point3<f64>) -> Option<Point2<f64>> {
        self.project_camera_point(&pose.transform_point(p))
    }

    pub fn is_finite(&self) -> bool {
        self.intrinsics.is_finite() && self.distortion.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> CameraModel {
        CameraModel::new(
            Intrinsics {
                fx: 800.0,
                fy: 780.0,
                cx: 320.0,
                cy: 240.0,
            },
            Distortion::default(),
        )
    }

    #[test]
    fn undistorted_projection_is_pinhole() {
        let cam = camera();
        let pose = ViewPose::new(Rotation3::identity(), Vector3::new(0.0, 0.0, 50.0));
        let uv = cam.project(&pose, &Point3::new(5.0, -2.0, 0.0)).unwrap();
        assert_relative_eq!(uv.x, 320.0 + 800.0 * 0.1, epsilon = 1e-12);
        assert_relative_eq!(uv.y, 240.0 - 780.0 * 0.04, epsilon = 1e-12);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let cam = camera();
        assert!(cam
            .project_camera_point(&Point3::new(0.0, 0.0, -1.0))
            .is_none());
    }

    #[test]
    fn barrel_distortion_pulls_points_inward() {
        let d = Distortion {
            k1: -0.2,
            ..Distortion::default()
        };
        let (xd, yd) = d.distort(0.3, 0.4);
        assert!(xd.abs() < 0.3 && yd.abs() < 0.4);
        assert_relative_eq!(xd, 0.3 * (1.0 - 0.2 * 0.25), epsilon = 1e-12);
    }

    #[test]
    fn rvec_round_trips() {
        let rvec = Vector3::new(0.1, -0.25, 0.05);
        let pose = ViewPose::from_rvec_tvec(rvec, Vector3::new(1.0, 2.0, 3.0));
        assert_relative_eq!(pose.rvec(), rvec, epsilon = 1e-12);
    }

    #[test]
    fn matrix_round_trips() {
        let k = camera().k_matrix();
        assert_eq!(Intrinsics::from_matrix(&k), camera().intrinsics);
        assert_eq!(k[(0, 1)], 0.0);
        assert_eq!(k[(2, 2)], 1.0);
    }
}
