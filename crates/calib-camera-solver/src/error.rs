use calib_camera_core::PatternError;

/// Fatal calibration failures. No partial result accompanies either variant.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("insufficient data: {reason}")]
    InsufficientData { reason: String },

    #[error("solver diverged: {reason}")]
    SolverDivergence { reason: String },

    #[error(transparent)]
    Pattern(#[from] PatternError),
}

impl CalibrationError {
    pub(crate) fn insufficient(reason: impl Into<String>) -> Self {
        Self::InsufficientData {
            reason: reason.into(),
        }
    }

    pub(crate) fn divergence(reason: impl Into<String>) -> Self {
        Self::SolverDivergence {
            reason: reason.into(),
        }
    }
}

/// A view rejected by the accumulator.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AccumulateError {
    #[error("corner set has {got} points, grid has {expected}")]
    LengthMismatch { expected: usize, got: usize },
}
