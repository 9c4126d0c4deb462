//! Error types for fundamental estimation

use rbe_core::CoreError;
use thiserror::Error;

/// Fundamental estimation errors
#[derive(Debug, Error)]
pub enum PitchError {
    /// Error from the partial model
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Estimator parameter out of range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Invalid sample rate
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    /// FFT error
    #[error("FFT error: {0}")]
    FftError(String),
}

impl PitchError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// True when the operation was cancelled through a progress hook.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Core(CoreError::Cancelled))
    }
}

/// Result type for fundamental estimation
pub type PitchResult<T> = Result<T, PitchError>;
