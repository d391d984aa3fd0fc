//! Human-readable and JSON outputs of a calibration run.

use crate::config::{save_json, ConfigError};
use crate::pipeline::CalibrationReport;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const RESULTS_FILE: &str = "calibration_results.txt";
pub const ORIENTATION_FILE: &str = "external_orientation.json";

/// Format a length given in millimetres: micrometres below 1 mm.
pub fn format_length_mm(value_mm: f64) -> String {
    if value_mm < 1.0 {
        format!("{:.1} µm", value_mm * 1000.0)
    } else {
        format!("{value_mm:.3} mm")
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraPositionCm {
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
    pub distance_to_chessboard_center_cm: f64,
}

/// Camera placement of the reference view, in board centimetres.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalOrientation {
    pub camera_position_cm: CameraPositionCm,
    pub rotation_matrix: [[f64; 3]; 3],
    pub translation_vector: [f64; 3],
}

impl ExternalOrientation {
    pub fn from_report(report: &CalibrationReport) -> Option<Self> {
        let pose = report.result.poses.get(report.reference_view)?;
        let p = &report.placement;
        let r = pose.rotation.matrix();
        let t = pose.translation;
        Some(Self {
            camera_position_cm: CameraPositionCm {
                x: round2(p.position.x),
                y: round2(p.position.y),
                z: round2(p.position.z),
                distance_to_chessboard_center_cm: round2(p.distance),
            },
            rotation_matrix: [
                [r[(0, 0)], r[(0, 1)], r[(0, 2)]],
                [r[(1, 0)], r[(1, 1)], r[(1, 2)]],
                [r[(2, 0)], r[(2, 1)], r[(2, 2)]],
            ],
            translation_vector: [t.x, t.y, t.z],
        })
    }
}

/// Plain-text summary of a calibration.
pub fn render_text(report: &CalibrationReport) -> String {
    let result = &report.result;
    let k = &result.camera.intrinsics;
    let d = &result.camera.distortion;
    let phys = &report.physical;
    let mut out = String::new();

    let _ = writeln!(out, "Camera calibration");
    let _ = writeln!(out, "==================");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Board: {}x{} inner corners, cell {} cm",
        report.geometry.corners_x, report.geometry.corners_y, report.geometry.cell_size
    );
    let _ = writeln!(
        out,
        "Images: {} used, {} skipped, {} total",
        report.accepted.len(),
        report.skipped.len(),
        report.total_images
    );
    for skipped in &report.skipped {
        let _ = writeln!(out, "  skipped {}: {}", skipped.path.display(), skipped.reason);
    }
    let _ = writeln!(
        out,
        "Image size: {}x{} px",
        result.image_size.width, result.image_size.height
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Camera matrix (K):");
    let km = result.camera.k_matrix();
    for r in 0..3 {
        let _ = writeln!(
            out,
            "  [{:12.4} {:12.4} {:12.4}]",
            km[(r, 0)],
            km[(r, 1)],
            km[(r, 2)]
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Distortion coefficients (k1, k2, p1, p2, k3):");
    let _ = writeln!(
        out,
        "  [{:.6} {:.6} {:.6} {:.6} {:.6}]",
        d.k1, d.k2, d.p1, d.p2, d.k3
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Principal point:");
    let _ = writeln!(out, "  pixels: cx = {:.2}, cy = {:.2}", k.cx, k.cy);
    let _ = writeln!(
        out,
        "  physical: cx = {}, cy = {}",
        format_length_mm(phys.cx),
        format_length_mm(phys.cy)
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "Focal length:");
    let _ = writeln!(out, "  pixels: f = {:.2}", 0.5 * (k.fx + k.fy));
    let _ = writeln!(out, "  physical: f = {}", format_length_mm(phys.focal_length));
    let _ = writeln!(out, "  pixel pitch: {}", format_length_mm(phys.pixel_pitch));
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Reprojection error: {:.4} px RMS over {} views ({} evaluations)",
        result.reprojection_error,
        result.num_views(),
        result.evaluations
    );
    for (path, err) in report.accepted.iter().zip(&result.per_view_errors) {
        let _ = writeln!(out, "  {:.4} px  {}", err, path.display());
    }
    let _ = writeln!(out);

    let _ = writeln!(
        out,
        "Distance to chessboard (view {}): {:.2} cm",
        report.reference_view, report.placement.distance
    );
    out
}

/// Write the text summary and the external orientation into `dir`,
/// creating it if needed. Returns the text path and, when the reference view
/// has a pose, the orientation path.
pub fn write_reports(
    report: &CalibrationReport,
    dir: &Path,
) -> Result<(PathBuf, Option<PathBuf>), ConfigError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::Io { path, source }
    };

    fs::create_dir_all(dir).map_err(io_err(dir))?;

    let text_path = dir.join(RESULTS_FILE);
    fs::write(&text_path, render_text(report)).map_err(io_err(&text_path))?;

    let json_path = match ExternalOrientation::from_report(report) {
        Some(orientation) => {
            let path = dir.join(ORIENTATION_FILE);
            save_json(&orientation, &path)?;
            Some(path)
        }
        None => None,
    };
    Ok((text_path, json_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SkippedImage;
    use calib_camera_core::{
        CameraModel, Distortion, ImageSize, Intrinsics, PatternGeometry, ViewPose,
    };
    use calib_camera_solver::{
        CalibrationResult, PoseEstimator, SensorGeometry, UnitConverter,
    };
    use nalgebra::{Rotation3, Vector3};

    fn report() -> CalibrationReport {
        let camera = CameraModel::new(
            Intrinsics {
                fx: 3000.0,
                fy: 3020.0,
                cx: 2016.0,
                cy: 1512.0,
            },
            Distortion {
                k1: 0.1,
                ..Distortion::default()
            },
        );
        let pose = ViewPose::new(
            Rotation3::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2),
            Vector3::new(1.234, -5.678, 40.0),
        );
        let result = CalibrationResult {
            camera,
            poses: vec![pose],
            reprojection_error: 0.25,
            per_view_errors: vec![0.25],
            image_size: ImageSize::new(4032, 3024),
            evaluations: 12,
            termination: "Converged { ftol: true, xtol: false }".into(),
        };
        let physical = UnitConverter::new(SensorGeometry::default())
            .unwrap()
            .convert(&camera.intrinsics);
        CalibrationReport {
            geometry: PatternGeometry::new(9, 6, 2.0).unwrap(),
            total_images: 2,
            accepted: vec![PathBuf::from("a.jpg")],
            skipped: vec![SkippedImage {
                path: PathBuf::from("b.jpg"),
                reason: "pattern not found".into(),
            }],
            placement: PoseEstimator::placement(&pose),
            result,
            reference_view: 0,
            physical,
        }
    }

    #[test]
    fn lengths_below_a_millimetre_use_micrometres() {
        assert_eq!(format_length_mm(0.0015625), "1.6 µm");
        assert_eq!(format_length_mm(0.999), "999.0 µm");
        assert_eq!(format_length_mm(1.0), "1.000 mm");
        assert_eq!(format_length_mm(4.6871), "4.687 mm");
    }

    #[test]
    fn text_report_lists_physical_values_and_skips() {
        let text = render_text(&report());
        assert!(text.contains("cx = 2016.00, cy = 1512.00"), "{text}");
        assert!(text.contains("cx = 3.150 mm"), "{text}");
        assert!(text.contains("f = 3010.00"), "{text}");
        assert!(text.contains("skipped b.jpg: pattern not found"), "{text}");
        assert!(text.contains("Images: 1 used, 1 skipped, 2 total"), "{text}");
    }

    #[test]
    fn orientation_is_rounded_to_centimetre_hundredths() {
        let orientation = ExternalOrientation::from_report(&report()).unwrap();
        let pos = &orientation.camera_position_cm;
        // Rz(90°): position = -Rᵀ t = (5.678, 1.234, -40).
        assert_eq!((pos.x, pos.y, pos.z), (5.68, 1.23, -40.0));
        assert_eq!(pos.distance_to_chessboard_center_cm, 40.42);
        assert_eq!(orientation.translation_vector, [1.234, -5.678, 40.0]);

        let json = serde_json::to_value(&orientation).unwrap();
        assert!(json["camera_position_cm"]["X"].is_number());
        assert!(json["rotation_matrix"][2][2].is_number());
    }

    #[test]
    fn reports_land_in_the_output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("results");
        let (text, json) = write_reports(&report(), &out).unwrap();
        assert_eq!(text, out.join(RESULTS_FILE));
        assert!(fs::read_to_string(&text).unwrap().starts_with("Camera calibration"));
        let json = json.unwrap();
        assert_eq!(json, out.join(ORIENTATION_FILE));
        let back: ExternalOrientation =
            serde_json::from_str(&fs::read_to_string(&json).unwrap()).unwrap();
        assert_eq!(back.camera_position_cm.distance_to_chessboard_center_cm, 40.42);
    }

    #[test]
    fn orientation_is_skipped_without_a_reference_pose() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = report();
        report.reference_view = 3;
        let (text, json) = write_reports(&report, dir.path()).unwrap();
        assert!(text.exists());
        assert_eq!(json, None);
        assert!(!dir.path().join(ORIENTATION_FILE).exists());
    }
}
