use crate::accumulator::CorrespondenceSet;
use crate::error::CalibrationError;
use crate::init::{initial_intrinsics, pose_from_homography, view_homographies};
use crate::backend_lm::{solve_lm, LmOptions};
use crate::problem::{CameraParamMask, PlanarCalibrationProblem, POSE_PARAMS};
use crate::result::{reprojection_errors, CalibrationResult};
use calib_camera_core::{CameraModel, Distortion, ImageSize, ViewPose};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Minimum corners per view for a plane homography.
pub const MIN_POINTS_PER_VIEW: usize = 4;

/// Solver configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    pub lm: LmOptions,
    /// Keep the sixth-order radial term at zero.
    pub fix_k3: bool,
    /// Keep both tangential terms at zero.
    pub zero_tangent_dist: bool,
    /// Fewer accepted views than this is `InsufficientData`.
    pub min_views: usize,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            lm: LmOptions::default(),
            fix_k3: false,
            zero_tangent_dist: false,
            min_views: 1,
        }
    }
}

impl SolverOptions {
    pub fn mask(&self) -> CameraParamMask {
        CameraParamMask {
            fix_k3: self.fix_k3,
            zero_tangent_dist: self.zero_tangent_dist,
        }
    }
}

/// Numerical engine behind [`CalibrationSolver`].
///
/// Implementations may assume the correspondence set is non-empty and that
/// every view carries at least [`MIN_POINTS_PER_VIEW`] points.
pub trait CalibrationBackend: Send + Sync {
    fn solve(
        &self,
        correspondences: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<CalibrationResult, CalibrationError>;
}

/// Closed-form initialisation followed by Levenberg-Marquardt refinement of
/// intrinsics, distortion and every view pose.
#[derive(Clone, Debug, Default)]
pub struct LmCalibrationBackend {
    pub options: SolverOptions,
}

impl LmCalibrationBackend {
    pub fn new(options: SolverOptions) -> Self {
        Self { options }
    }

    fn initial_guess(
        &self,
        set: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<(CameraModel, Vec<ViewPose>), CalibrationError> {
        let homographies = view_homographies(set)?;
        let intrinsics = initial_intrinsics(&homographies, image_size);
        log::debug!(
            "initial intrinsics fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
            intrinsics.fx,
            intrinsics.fy,
            intrinsics.cx,
            intrinsics.cy
        );

        let k = intrinsics.matrix();
        let poses = homographies
            .iter()
            .enumerate()
            .map(|(v, h)| {
                pose_from_homography(&k, h).ok_or_else(|| {
                    CalibrationError::divergence(format!("view {v}: pose initialisation failed"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((CameraModel::new(intrinsics, Distortion::default()), poses))
    }
}

impl CalibrationBackend for LmCalibrationBackend {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, correspondences), fields(views = correspondences.num_views()))
    )]
    fn solve(
        &self,
        correspondences: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<CalibrationResult, CalibrationError> {
        let mask = self.options.mask();
        let num_params = mask.num_free() + POSE_PARAMS * correspondences.num_views();
        let num_residuals = 2 * correspondences.num_points();
        if num_residuals < num_params {
            return Err(CalibrationError::insufficient(format!(
                "{num_residuals} residuals cannot constrain {num_params} parameters"
            )));
        }

        let (camera0, poses0) = self.initial_guess(correspondences, image_size)?;
        let problem = PlanarCalibrationProblem::new(correspondences, &camera0, mask);

        let x0 = problem.pack(&camera0, &poses0);
        let (x, report) = solve_lm(&problem, x0, &self.options.lm);
        log::debug!(
            "refinement: cost {:.6e} -> {:.6e} in {} evaluations ({})",
            report.initial_cost,
            report.final_cost,
            report.evaluations,
            report.termination
        );

        if !report.converged {
            return Err(CalibrationError::divergence(format!(
                "no convergence after {} evaluations: {}",
                report.evaluations, report.termination
            )));
        }

        let (camera, poses) = problem.unpack(&x);
        if !camera.is_finite() || poses.iter().any(|p| !p.is_finite()) {
            return Err(CalibrationError::divergence("non-finite parameters"));
        }
        if camera.intrinsics.fx <= 0.0 || camera.intrinsics.fy <= 0.0 {
            return Err(CalibrationError::divergence(format!(
                "non-positive focal length (fx={}, fy={})",
                camera.intrinsics.fx, camera.intrinsics.fy
            )));
        }

        let (reprojection_error, per_view_errors) =
            reprojection_errors(&camera, &poses, correspondences)
                .ok_or_else(|| CalibrationError::divergence("board behind the camera"))?;
        if !reprojection_error.is_finite() {
            return Err(CalibrationError::divergence("non-finite reprojection error"));
        }

        Ok(CalibrationResult {
            camera,
            poses,
            reprojection_error,
            per_view_errors,
            image_size,
            evaluations: report.evaluations,
            termination: report.termination,
        })
    }
}

/// Validates a correspondence set and hands it to a [`CalibrationBackend`].
pub struct CalibrationSolver<B = LmCalibrationBackend> {
    backend: B,
    min_views: usize,
}

impl CalibrationSolver<LmCalibrationBackend> {
    pub fn new(options: SolverOptions) -> Self {
        let min_views = options.min_views;
        Self {
            backend: LmCalibrationBackend::new(options),
            min_views,
        }
    }
}

impl Default for CalibrationSolver<LmCalibrationBackend> {
    fn default() -> Self {
        Self::new(SolverOptions::default())
    }
}

impl<B: CalibrationBackend> CalibrationSolver<B> {
    pub fn with_backend(backend: B, min_views: usize) -> Self {
        Self { backend, min_views }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Calibrate from every view in `correspondences`.
    ///
    /// The backend only runs once the set holds at least `max(1, min_views)`
    /// views, each with at least [`MIN_POINTS_PER_VIEW`] points.
    pub fn calibrate(
        &self,
        correspondences: &CorrespondenceSet,
        image_size: ImageSize,
    ) -> Result<CalibrationResult, CalibrationError> {
        if correspondences.is_empty() {
            return Err(CalibrationError::insufficient("no views"));
        }
        let required = self.min_views.max(1);
        if correspondences.num_views() < required {
            return Err(CalibrationError::insufficient(format!(
                "{} view(s), at least {required} required",
                correspondences.num_views()
            )));
        }
        if let Some((v, (_, img))) = correspondences
            .views()
            .enumerate()
            .find(|(_, (_, img))| img.len() < MIN_POINTS_PER_VIEW)
        {
            return Err(CalibrationError::insufficient(format!(
                "view {v} has {} points, at least {MIN_POINTS_PER_VIEW} required",
                img.len()
            )));
        }

        log::info!(
            "calibrating from {} views ({} points)",
            correspondences.num_views(),
            correspondences.num_points()
        );
        self.backend.solve(correspondences, image_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_camera_core::{ObjectPointGrid, PatternGeometry};
    use nalgebra::Point2;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingBackend {
        calls: AtomicUsize,
    }

    impl CalibrationBackend for CountingBackend {
        fn solve(
            &self,
            _: &CorrespondenceSet,
            _: ImageSize,
        ) -> Result<CalibrationResult, CalibrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(CalibrationError::divergence("counting backend"))
        }
    }

    fn grid(cx: u32, cy: u32) -> ObjectPointGrid {
        PatternGeometry::new(cx, cy, 1.0).unwrap().object_points()
    }

    fn dummy_points(n: usize) -> Vec<Point2<f64>> {
        (0..n).map(|k| Point2::new(k as f64, k as f64)).collect()
    }

    #[test]
    fn empty_set_never_reaches_the_backend() {
        let solver = CalibrationSolver::with_backend(CountingBackend::default(), 1);
        let err = solver
            .calibrate(&CorrespondenceSet::new(), ImageSize::new(640, 480))
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientData { .. }));
        assert_eq!(solver.backend().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn view_policy_is_checked_before_the_backend() {
        let mut set = CorrespondenceSet::new();
        set.push(grid(3, 2), dummy_points(6)).unwrap();

        let strict = CalibrationSolver::with_backend(CountingBackend::default(), 3);
        assert!(matches!(
            strict.calibrate(&set, ImageSize::new(64, 48)),
            Err(CalibrationError::InsufficientData { .. })
        ));
        assert_eq!(strict.backend().calls.load(Ordering::SeqCst), 0);

        let lenient = CalibrationSolver::with_backend(CountingBackend::default(), 0);
        assert!(matches!(
            lenient.calibrate(&set, ImageSize::new(64, 48)),
            Err(CalibrationError::SolverDivergence { .. })
        ));
        assert_eq!(lenient.backend().calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn tiny_views_are_rejected() {
        let mut set = CorrespondenceSet::new();
        set.push(grid(3, 2), dummy_points(6)).unwrap();
        let tiny = PatternGeometry {
            corners_x: 3,
            corners_y: 1,
            cell_size: 1.0,
        };
        set.push(ObjectPointGrid::new(&tiny), dummy_points(3))
            .unwrap();

        let solver = CalibrationSolver::with_backend(CountingBackend::default(), 1);
        let err = solver.calibrate(&set, ImageSize::new(64, 48)).unwrap_err();
        assert!(err.to_string().contains("view 1 has 3 points"), "{err}");
        assert_eq!(solver.backend().calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: SolverOptions = serde_json::from_str(r#"{"fix_k3": true}"#).unwrap();
        assert!(opts.fix_k3);
        assert_eq!(opts.min_views, 1);
        assert_eq!(opts.lm, LmOptions::default());
        assert_eq!(
            opts.mask(),
            CameraParamMask {
                fix_k3: true,
                zero_tangent_dist: false
            }
        );
    }
}
