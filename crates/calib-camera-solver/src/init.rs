//! Closed-form starting point for the nonlinear refinement.
//!
//! Per-view plane homographies feed Zhang's linear estimate of `K` (three or
//! more views). With fewer views, or when Zhang's system is degenerate, the
//! principal point is pinned to the image centre and only the focal lengths
//! are solved from the homography orthogonality constraints.

use crate::accumulator::CorrespondenceSet;
use crate::error::CalibrationError;
use calib_camera_core::{estimate_homography, ImageSize, Intrinsics, ViewPose};
use nalgebra::{DMatrix, Matrix2, Matrix3, Point2, Rotation3, SVector, Vector2, Vector3};

/// Plane-to-image homography of every view, scaled to unit Frobenius norm.
pub fn view_homographies(set: &CorrespondenceSet) -> Result<Vec<Matrix3<f64>>, CalibrationError> {
    set.views()
        .enumerate()
        .map(|(v, (obj, img))| {
            let plane: Vec<Point2<f64>> = obj.iter().map(|p| Point2::new(p.x, p.y)).collect();
            let h = estimate_homography(&plane, img).ok_or_else(|| {
                CalibrationError::divergence(format!("view {v}: homography estimation failed"))
            })?;
            Ok(h.h / h.h.norm())
        })
        .collect()
}

/// Similarity taking pixels to a centred frame of roughly unit extent.
fn pixel_normalization(size: ImageSize) -> Matrix3<f64> {
    let s = 2.0 / (size.width as f64 + size.height as f64).max(1.0);
    let c = size.center();
    Matrix3::new(
        s, 0.0, -s * c.x, //
        0.0, s, -s * c.y, //
        0.0, 0.0, 1.0,
    )
}

fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form intrinsics (skew dropped). `None` when the stacked
/// constraints are degenerate or yield a non-physical camera.
pub fn zhang_intrinsics(homographies: &[Matrix3<f64>], size: ImageSize) -> Option<Intrinsics> {
    if homographies.len() < 3 {
        return None;
    }
    let n = pixel_normalization(size);

    let m = homographies.len();
    let mut vmtx = DMatrix::<f64>::zeros(2 * m, 6);
    for (k, h) in homographies.iter().enumerate() {
        let hn = n * h;
        let hn = hn / hn.norm();
        let v11 = v_ij(&hn, 0, 0);
        let v22 = v_ij(&hn, 1, 1);
        let v12 = v_ij(&hn, 0, 1);
        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    // V b = 0: right singular vector of the smallest singular value.
    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t?;
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let b = v_t.row(min_idx);
    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return None;
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() {
        return None;
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    // Undo the pixel normalization: K = N⁻¹ K'.
    let k_norm = Matrix3::new(
        alpha, gamma, u0, //
        0.0, beta, v0, //
        0.0, 0.0, 1.0,
    );
    let k = n.try_inverse()? * k_norm;
    let intrinsics = Intrinsics::from_matrix(&(k / k[(2, 2)]));
    plausible(&intrinsics, size).then_some(intrinsics)
}

/// Focal lengths with the principal point fixed at the image centre.
///
/// With `ω = diag(1/fx², 1/fy², 1)` for a centred camera, each homography
/// gives `h1ᵀωh2 = 0` and `h1ᵀωh1 = h2ᵀωh2`, linear in `(1/fx², 1/fy²)`.
/// A single fronto-parallel view leaves these degenerate; the focal length
/// then falls back to the larger image side with `fx = fy`.
pub fn centred_intrinsics(homographies: &[Matrix3<f64>], size: ImageSize) -> Intrinsics {
    let c = size.center();
    let n = pixel_normalization(size);
    let s = n[(0, 0)];

    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();
    for h in homographies {
        let hn = n * h;
        let hn = hn / hn.norm();
        let (h1, h2) = (hn.column(0), hn.column(1));
        let rows = [
            (
                Vector2::new(h1[0] * h2[0], h1[1] * h2[1]),
                -h1[2] * h2[2],
            ),
            (
                Vector2::new(h1[0] * h1[0] - h2[0] * h2[0], h1[1] * h1[1] - h2[1] * h2[1]),
                -(h1[2] * h1[2] - h2[2] * h2[2]),
            ),
        ];
        for (a, b) in rows {
            ata += a * a.transpose();
            atb += a * b;
        }
    }

    let fallback = (size.width.max(size.height) as f64).max(1.0);
    let well_posed = ata.determinant().abs() > 1e-12 * ata.trace().powi(2);
    let solution = if well_posed {
        ata.try_inverse().map(|inv| inv * atb)
    } else {
        None
    };
    let (fx, fy) = match solution {
        Some(w) if w[0] > 0.0 && w[1] > 0.0 => {
            (1.0 / (w[0].sqrt() * s), 1.0 / (w[1].sqrt() * s))
        }
        _ => {
            log::debug!("focal lengths unobservable from homographies, using {fallback}");
            (fallback, fallback)
        }
    };

    Intrinsics {
        fx,
        fy,
        cx: c.x,
        cy: c.y,
    }
}

/// Reject estimates with non-positive focal lengths or a principal point
/// far outside the image.
fn plausible(k: &Intrinsics, size: ImageSize) -> bool {
    let (w, h) = (size.width as f64, size.height as f64);
    k.is_finite()
        && k.fx > 0.0
        && k.fy > 0.0
        && k.cx > -0.5 * w
        && k.cx < 1.5 * w
        && k.cy > -0.5 * h
        && k.cy < 1.5 * h
}

/// Initial intrinsics: Zhang when it yields a plausible camera, otherwise a
/// centred principal point with solved focal lengths.
pub fn initial_intrinsics(homographies: &[Matrix3<f64>], size: ImageSize) -> Intrinsics {
    match zhang_intrinsics(homographies, size) {
        Some(k) => k,
        None => {
            log::debug!(
                "closed-form intrinsics unavailable for {} view(s), pinning principal point to centre",
                homographies.len()
            );
            centred_intrinsics(homographies, size)
        }
    }
}

/// Board pose from a plane homography and intrinsics.
///
/// `K⁻¹H` is scaled so its first two columns have unit mean norm, the sign
/// is chosen to put the board in front of the camera, and the rotation is
/// projected onto SO(3).
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Matrix3<f64>) -> Option<ViewPose> {
    let k_inv = k.try_inverse()?;
    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let (n1, n2) = (a1.norm(), a2.norm());
    if n1 <= 1e-12 || n2 <= 1e-12 {
        return None;
    }
    let mut lambda = 2.0 / (n1 + n2);
    if a3.z < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<f64> = a1 * lambda;
    let r2: Vector3<f64> = a2 * lambda;
    let t: Vector3<f64> = a3 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return None;
    }

    let r = Matrix3::from_columns(&[r1, r2, r3]);
    let svd = r.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    Some(ViewPose::new(Rotation3::from_matrix_unchecked(r_orth), t))
}
