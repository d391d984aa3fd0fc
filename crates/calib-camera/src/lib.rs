//! Planar chessboard camera calibration, end to end.
//!
//! This crate provides:
//! - re-exports of the workspace crates (`core`, `chessboard`, `solver`),
//! - [`pipeline`]: image discovery, parallel detection and the solve,
//! - [`config`] and [`layout`]: the target record and screen board planning,
//! - [`report`]: the text summary and `external_orientation.json`.
//!
//! ## Quickstart
//!
//! ```no_run
//! use calib_camera::config::{CalibrationConfig, TargetConfig};
//! use calib_camera::pipeline::CalibrationPipeline;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let target = TargetConfig::load(Path::new("results/chessboard_config.json"))?;
//! let pipeline = CalibrationPipeline::new(&target, CalibrationConfig::default())?;
//! let report = pipeline.run_dir(Path::new("data/photos"))?;
//! println!(
//!     "rms {:.3} px, camera {:.2} cm from the board",
//!     report.result.reprojection_error, report.placement.distance
//! );
//! # Ok(())
//! # }
//! ```

pub use calib_camera_chessboard as chessboard;
pub use calib_camera_core as core;
pub use calib_camera_solver as solver;

pub use calib_camera_chessboard::{ChessboardDetector, ChessboardParams, DetectError};
pub use calib_camera_core::{CameraModel, CornerSet, ImageRotation, PatternGeometry, ViewPose};
pub use calib_camera_solver::{
    CalibrationError, CalibrationResult, CalibrationSolver, CameraPlacement, SensorGeometry,
    SolverOptions,
};

pub mod config;
pub mod layout;
pub mod pipeline;
pub mod report;

pub use config::{CalibrationConfig, ConfigError, TargetConfig};
pub use pipeline::{CalibrationPipeline, CalibrationReport, PipelineError};
