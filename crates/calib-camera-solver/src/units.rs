//! Pixel to physical-length conversion of intrinsics.

use calib_camera_core::Intrinsics;
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("physical sensor width must be finite and > 0 (got {0})")]
    InvalidWidth(f64),
    #[error("sensor pixel width must be finite and > 0 (got {0})")]
    InvalidPixelWidth(f64),
}

/// Assumed sensor dimensions along the image x axis.
///
/// `physical_sensor_width` is in millimetres; converted lengths come out in
/// the same unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorGeometry {
    pub physical_sensor_width: f64,
    pub sensor_pixel_width: f64,
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            physical_sensor_width: 6.3,
            sensor_pixel_width: 4032.0,
        }
    }
}

impl SensorGeometry {
    pub fn new(physical_sensor_width: f64, sensor_pixel_width: f64) -> Result<Self, SensorError> {
        let sensor = Self {
            physical_sensor_width,
            sensor_pixel_width,
        };
        sensor.validate()?;
        Ok(sensor)
    }

    pub fn validate(&self) -> Result<(), SensorError> {
        if !(self.physical_sensor_width.is_finite() && self.physical_sensor_width > 0.0) {
            return Err(SensorError::InvalidWidth(self.physical_sensor_width));
        }
        if !(self.sensor_pixel_width.is_finite() && self.sensor_pixel_width > 0.0) {
            return Err(SensorError::InvalidPixelWidth(self.sensor_pixel_width));
        }
        Ok(())
    }

    /// Physical size of one pixel.
    pub fn pixel_pitch(&self) -> f64 {
        self.physical_sensor_width / self.sensor_pixel_width
    }
}

/// Intrinsics in physical length units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalIntrinsics {
    pub fx: f64,
    pub fy: f64,
    /// Mean of `fx` and `fy`.
    pub focal_length: f64,
    pub cx: f64,
    pub cy: f64,
    pub pixel_pitch: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitConverter {
    sensor: SensorGeometry,
}

impl UnitConverter {
    pub fn new(sensor: SensorGeometry) -> Result<Self, SensorError> {
        sensor.validate()?;
        Ok(Self { sensor })
    }

    pub fn sensor(&self) -> &SensorGeometry {
        &self.sensor
    }

    pub fn convert(&self, k: &Intrinsics) -> PhysicalIntrinsics {
        let pitch = self.sensor.pixel_pitch();
        PhysicalIntrinsics {
            fx: k.fx * pitch,
            fy: k.fy * pitch,
            focal_length: 0.5 * (k.fx + k.fy) * pitch,
            cx: k.cx * pitch,
            cy: k.cy * pitch,
            pixel_pitch: pitch,
        }
    }
}
