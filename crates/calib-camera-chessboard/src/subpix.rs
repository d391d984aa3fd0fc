//! Iterative gradient sub-pixel corner refinement.
//!
//! At the true saddle point `q` every image gradient `g(p)` in the window is
//! orthogonal to `p - q`. Each iteration solves the Gaussian-weighted normal
//! equations `Σ g gᵀ · q = Σ g gᵀ · p` around the current estimate.

use crate::params::SubpixParams;
use calib_camera_core::{sample_bilinear, GrayImageView};
use nalgebra::Point2;
use rayon::prelude::*;

fn gaussian_mask(half_window: usize) -> Vec<f64> {
    let win = half_window as f64;
    (0..=2 * half_window)
        .map(|k| {
            let x = (k as f64 - win) / win;
            (-x * x).exp()
        })
        .collect()
}

/// Refine a single corner starting from `start`.
///
/// The estimate is returned unchanged when the window holds no usable
/// structure; a result that drifts more than `half_window` pixels from
/// `start` is discarded in favour of `start`.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    params: &SubpixParams,
) -> Point2<f64> {
    if params.half_window == 0 {
        return start;
    }
    let mask = gaussian_mask(params.half_window);
    refine_with_mask(img, start, params, &mask)
}

fn refine_with_mask(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    params: &SubpixParams,
    mask: &[f64],
) -> Point2<f64> {
    let win = params.half_window as i32;
    let eps2 = (params.epsilon * params.epsilon).max(1e-24);
    let (w, h) = (img.width as f64, img.height as f64);

    let mut ci = start;
    for _ in 0..params.max_iterations {
        let (mut a, mut b, mut c, mut bb1, mut bb2) = (0.0, 0.0, 0.0, 0.0, 0.0);

        for (row, dy) in (-win..=win).enumerate() {
            let py = dy as f64;
            let y = ci.y + py;
            for (col, dx) in (-win..=win).enumerate() {
                let px = dx as f64;
                let x = ci.x + px;
                let m = mask[row] * mask[col];

                let gx = sample_bilinear(img, x + 1.0, y) - sample_bilinear(img, x - 1.0, y);
                let gy = sample_bilinear(img, x, y + 1.0) - sample_bilinear(img, x, y - 1.0);
                let gxx = gx * gx * m;
                let gxy = gx * gy * m;
                let gyy = gy * gy * m;

                a += gxx;
                b += gxy;
                c += gyy;
                bb1 += gxx * px + gxy * py;
                bb2 += gxy * px + gyy * py;
            }
        }

        let det = a * c - b * b;
        if det.abs() <= f64::EPSILON * a.max(c).max(1.0) * a.max(c).max(1.0) {
            break;
        }
        let scale = 1.0 / det;
        let next = Point2::new(
            ci.x + c * scale * bb1 - b * scale * bb2,
            ci.y - b * scale * bb1 + a * scale * bb2,
        );
        let step2 = (next - ci).norm_squared();
        ci = next;

        if ci.x < 0.0 || ci.x >= w || ci.y < 0.0 || ci.y >= h || step2 <= eps2 {
            break;
        }
    }

    let drift = ci - start;
    if drift.x.abs() > params.half_window as f64 || drift.y.abs() > params.half_window as f64 {
        return start;
    }
    ci
}

/// Refine every corner in place.
pub fn refine_corners(img: &GrayImageView<'_>, corners: &mut [Point2<f64>], params: &SubpixParams) {
    if params.half_window == 0 {
        return;
    }
    let mask = gaussian_mask(params.half_window);
    corners
        .par_iter_mut()
        .for_each(|p| *p = refine_with_mask(img, *p, params, &mask));
}
