//! Synthetic chessboard views for tests and demos.
//!
//! Poses place the board centre on the optical axis and tilt it about both
//! image axes, which keeps every view well conditioned for intrinsic
//! estimation. [`render_chessboard`] rasterises a board through a plane
//! homography with box-filter supersampling.

use crate::{
    CameraModel, GrayImage, Homography, ImageSize, Intrinsics, ObjectPointGrid, PatternGeometry,
    ViewPose,
};
use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};

const DARK: f64 = 30.0;
const LIGHT: f64 = 225.0;
const BACKGROUND: f64 = 128.0;

/// `n_views` poses looking at the board centre from `distance`, with tilts of
/// up to `max_tilt` radians that sweep around the optical axis.
pub fn orbit_poses(
    geometry: &PatternGeometry,
    n_views: usize,
    distance: f64,
    max_tilt: f64,
) -> Vec<ViewPose> {
    let centre = Vector3::new(
        (geometry.corners_x - 1) as f64 * geometry.cell_size * 0.5,
        (geometry.corners_y - 1) as f64 * geometry.cell_size * 0.5,
        0.0,
    );

    (0..n_views)
        .map(|k| {
            let phase = std::f64::consts::TAU * k as f64 / n_views.max(1) as f64;
            let tilt_x = max_tilt * phase.sin();
            let tilt_y = max_tilt * phase.cos();
            let roll = 0.04 * (k as f64 - n_views as f64 * 0.5);
            let rotation = Rotation3::from_euler_angles(tilt_x, tilt_y, roll);
            let depth = distance * (1.0 + 0.08 * (k % 3) as f64);
            let translation = Vector3::new(0.0, 0.0, depth) - rotation * centre;
            ViewPose::new(rotation, translation)
        })
        .collect()
}

/// Project every object point through `camera` under `pose`.
///
/// `None` when any point falls behind the camera.
pub fn project_view(
    camera: &CameraModel,
    pose: &ViewPose,
    grid: &ObjectPointGrid,
) -> Option<Vec<Point2<f64>>> {
    grid.points()
        .iter()
        .map(|p| camera.project(pose, p))
        .collect()
}

/// Homography taking board-plane `(X, Y)` to undistorted pixels: `K [r1 r2 t]`.
pub fn plane_homography(intrinsics: &Intrinsics, pose: &ViewPose) -> Homography {
    let r = pose.rotation.matrix();
    let t = pose.translation;
    let rt = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), t]);
    let h = intrinsics.matrix() * rt;
    Homography::new(h / h[(2, 2)])
}

/// Rasterise the chessboard described by `geometry` into a `size` image.
///
/// The board carries `corners + 1` squares per axis so that inner corner
/// `(i, j)` lands on board point `(i, j) * cell_size`, framed by a one-cell
/// light quiet zone on a mid-grey background. Each output pixel averages a
/// `supersample × supersample` grid of taps. Returns `None` when
/// `img_from_board` is singular.
pub fn render_chessboard(
    geometry: &PatternGeometry,
    size: ImageSize,
    img_from_board: &Homography,
    supersample: usize,
) -> Option<GrayImage> {
    let board_from_img = img_from_board.inverse()?;
    let s = supersample.max(1);
    let width = size.width as usize;
    let height = size.height as usize;
    let mut data = vec![0u8; width * height];

    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for sy in 0..s {
                for sx in 0..s {
                    let px = x as f64 + (sx as f64 + 0.5) / s as f64 - 0.5;
                    let py = y as f64 + (sy as f64 + 0.5) / s as f64 - 0.5;
                    let b = board_from_img.apply(Point2::new(px, py));
                    acc += board_intensity(geometry, b);
                }
            }
            data[y * width + x] = (acc / (s * s) as f64).round().clamp(0.0, 255.0) as u8;
        }
    }

    Some(GrayImage {
        width,
        height,
        data,
    })
}

fn board_intensity(geometry: &PatternGeometry, b: Point2<f64>) -> f64 {
    if !b.x.is_finite() || !b.y.is_finite() {
        return BACKGROUND;
    }
    let u = b.x / geometry.cell_size;
    let v = b.y / geometry.cell_size;
    let nx = geometry.corners_x as f64;
    let ny = geometry.corners_y as f64;

    if u < -2.0 || v < -2.0 || u > nx + 1.0 || v > ny + 1.0 {
        return BACKGROUND;
    }
    if u < -1.0 || v < -1.0 || u > nx || v > ny {
        return LIGHT;
    }
    let parity = (u.floor() as i64 + v.floor() as i64).rem_euclid(2);
    if parity == 0 {
        DARK
    } else {
        LIGHT
    }
}

/// Distortion-free projection of board corners through a plane homography.
pub fn project_with_homography(h: &Homography, grid: &ObjectPointGrid) -> Vec<Point2<f64>> {
    grid.points()
        .iter()
        .map(|p: &Point3<f64>| h.apply(Point2::new(p.x, p.y)))
        .collect()
}
