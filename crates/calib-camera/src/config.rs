//! JSON configuration records.
//!
//! [`TargetConfig`] describes the displayed board and is produced by
//! [`crate::layout::plan_target`]; [`CalibrationConfig`] holds the tuning
//! knobs of a calibration run.

use calib_camera_chessboard::ChessboardParams;
use calib_camera_core::{PatternError, PatternGeometry};
use calib_camera_solver::{SensorError, SensorGeometry, SolverOptions};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Pattern(#[from] PatternError),

    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("invalid screen: {0}")]
    Screen(String),
}

pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), ConfigError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json + "\n").map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Board shown on screen and photographed.
///
/// Only `chessboard_corners` and `chessboard_cell_size_cm` drive calibration;
/// the other fields describe the display and survive a load/save round trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Inner corners along x and y.
    pub chessboard_corners: [u32; 2],
    pub chessboard_cell_size_cm: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_resolution: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_diagonal_inch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_size_cm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chessboard_cells: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chessboard_display_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_display_index: Option<u32>,
}

impl TargetConfig {
    /// A bare target with no display metadata.
    pub fn new(corners_x: u32, corners_y: u32, cell_size_cm: f64) -> Self {
        Self {
            chessboard_corners: [corners_x, corners_y],
            chessboard_cell_size_cm: cell_size_cm,
            screen_resolution: None,
            physical_diagonal_inch: None,
            pixel_size_cm: None,
            chessboard_cells: None,
            chessboard_display_ratio: None,
            target_display_index: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_json(self, path)
    }

    /// Validated pattern geometry in centimetres.
    pub fn geometry(&self) -> Result<PatternGeometry, PatternError> {
        let [x, y] = self.chessboard_corners;
        PatternGeometry::new(x, y, self.chessboard_cell_size_cm)
    }
}

/// Settings of one calibration run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub sensor: SensorGeometry,
    /// View whose pose defines the reported camera placement.
    pub reference_view: usize,
    pub detector: ChessboardParams,
    pub solver: SolverOptions,
}

impl CalibrationConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_json(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        save_json(self, path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sensor.validate()?;
        Ok(())
    }
}
