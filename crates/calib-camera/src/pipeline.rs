//! Images in, calibration out.

use crate::config::{CalibrationConfig, ConfigError, TargetConfig};
use calib_camera_chessboard::{load_gray, ChessboardDetector, DetectError};
use calib_camera_core::{CornerSet, ImageSize, PatternGeometry};
use calib_camera_solver::{
    CalibrationError, CalibrationResult, CalibrationSolver, CameraPlacement,
    CorrespondenceAccumulator, PhysicalIntrinsics, PoseError, PoseEstimator, UnitConverter,
};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// File extensions picked up by [`discover_images`], compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "png", "jpeg"];

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to list {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no images found in {0}")]
    NoImages(PathBuf),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error(transparent)]
    Pose(#[from] PoseError),
}

/// Image files directly inside `dir`, sorted by path.
pub fn discover_images(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let io_err = |source| PipelineError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut images = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

/// An image that did not contribute a view.
#[derive(Clone, Debug, PartialEq)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

/// Everything a calibration run produced.
#[derive(Clone, Debug)]
pub struct CalibrationReport {
    pub geometry: PatternGeometry,
    pub total_images: usize,
    /// Paths of the views, index-aligned with `result.poses`.
    pub accepted: Vec<PathBuf>,
    pub skipped: Vec<SkippedImage>,
    pub result: CalibrationResult,
    pub reference_view: usize,
    pub placement: CameraPlacement,
    pub physical: PhysicalIntrinsics,
}

/// Detection, accumulation, solve and post-processing over a list of images.
pub struct CalibrationPipeline {
    geometry: PatternGeometry,
    config: CalibrationConfig,
    detector: ChessboardDetector,
    converter: UnitConverter,
}

impl CalibrationPipeline {
    pub fn new(target: &TargetConfig, config: CalibrationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let geometry = target.geometry()?;
        let detector = ChessboardDetector::new(geometry, config.detector.clone())?;
        let converter = UnitConverter::new(config.sensor)?;
        Ok(Self {
            geometry,
            config,
            detector,
            converter,
        })
    }

    pub fn geometry(&self) -> &PatternGeometry {
        &self.geometry
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Detect the board in every image; the output follows input order.
    pub fn detect_all(&self, paths: &[PathBuf]) -> Vec<Result<CornerSet, DetectError>> {
        paths
            .par_iter()
            .map(|path| {
                let img = load_gray(path)?;
                self.detector.detect(&img)
            })
            .collect()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, paths), fields(images = paths.len()))
    )]
    pub fn run(&self, paths: &[PathBuf]) -> Result<CalibrationReport, PipelineError> {
        let detections = self.detect_all(paths);

        let mut acc = CorrespondenceAccumulator::new(self.geometry.object_points());
        let mut skipped = Vec::new();
        let mut image_size: Option<(u32, u32)> = None;

        for (index, (path, detection)) in paths.iter().zip(detections).enumerate() {
            let outcome = detection.and_then(|set| {
                let expected = *image_size.get_or_insert(set.image_size);
                if set.image_size == expected {
                    Ok(set)
                } else {
                    Err(DetectError::ResolutionMismatch {
                        path: path.clone(),
                        width: set.image_size.0,
                        height: set.image_size.1,
                        expected_width: expected.0,
                        expected_height: expected.1,
                    })
                }
            });

            let reason = match outcome {
                Ok(set) => {
                    let rotation = set.rotation;
                    match acc.push(index, set) {
                        Ok(()) => {
                            log::info!(
                                "[{}/{}] ok {} ({}°)",
                                index + 1,
                                paths.len(),
                                path.display(),
                                rotation.degrees()
                            );
                            continue;
                        }
                        Err(err) => err.to_string(),
                    }
                }
                Err(err) => {
                    acc.record_failure(index, err.to_string());
                    err.to_string()
                }
            };
            log::warn!(
                "[{}/{}] skipped {}: {reason}",
                index + 1,
                paths.len(),
                path.display()
            );
            skipped.push(SkippedImage {
                path: path.clone(),
                reason,
            });
        }

        log::info!(
            "{} of {} images usable, {} skipped",
            acc.successes(),
            paths.len(),
            acc.failure_count()
        );

        let Some((width, height)) = image_size else {
            return Err(CalibrationError::InsufficientData {
                reason: format!("the pattern was not found in any of {} images", paths.len()),
            }
            .into());
        };

        let solver = CalibrationSolver::new(self.config.solver.clone());
        let result = solver.calibrate(acc.correspondences(), ImageSize::new(width, height))?;
        let placement = PoseEstimator::for_view(&result, self.config.reference_view)?;
        let physical = self.converter.convert(&result.camera.intrinsics);

        let accepted = acc
            .accepted_images()
            .iter()
            .map(|&i| paths[i].clone())
            .collect();

        Ok(CalibrationReport {
            geometry: self.geometry,
            total_images: paths.len(),
            accepted,
            skipped,
            result,
            reference_view: self.config.reference_view,
            placement,
            physical,
        })
    }

    /// [`discover_images`] followed by [`CalibrationPipeline::run`].
    pub fn run_dir(&self, dir: &Path) -> Result<CalibrationReport, PipelineError> {
        let paths = discover_images(dir)?;
        if paths.is_empty() {
            return Err(PipelineError::NoImages(dir.to_path_buf()));
        }
        log::info!("processing {} images from {}", paths.len(), dir.display());
        self.run(&paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn discovery_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "c.jpeg", "notes.txt", "d.tiff", "e.JPG"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = discover_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.jpg", "b.PNG", "c.jpeg", "e.JPG"]);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_images(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }

    #[test]
    fn empty_directory_reports_no_images() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline =
            CalibrationPipeline::new(&TargetConfig::new(9, 6, 2.0), CalibrationConfig::default())
                .unwrap();
        assert!(matches!(
            pipeline.run_dir(dir.path()),
            Err(PipelineError::NoImages(_))
        ));
    }

    #[test]
    fn unreadable_images_end_in_insufficient_data() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let pipeline =
            CalibrationPipeline::new(&TargetConfig::new(9, 6, 2.0), CalibrationConfig::default())
                .unwrap();
        let err = pipeline.run_dir(dir.path()).unwrap_err();
        assert!(
            matches!(
                err,
                PipelineError::Calibration(CalibrationError::InsufficientData { .. })
            ),
            "{err}"
        );
    }

    #[test]
    fn invalid_configuration_is_fatal() {
        let mut config = CalibrationConfig::default();
        config.sensor.sensor_pixel_width = 0.0;
        assert!(CalibrationPipeline::new(&TargetConfig::new(9, 6, 2.0), config).is_err());
        assert!(CalibrationPipeline::new(
            &TargetConfig::new(9, 1, 2.0),
            CalibrationConfig::default()
        )
        .is_err());
    }
}
