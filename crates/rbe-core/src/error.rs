//! Error types for the sound model

use thiserror::Error;

/// Core error type
///
/// Shared by every algorithm in the workspace. File and pitch crates wrap it
/// in their own enums; the C boundary maps each variant to an error category.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed parameters: negative times, non-positive labels or
    /// frequencies, mismatched sequence lengths.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation preconditions violated: empty required partial,
    /// un-distilled input, missing reference label.
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Query on a partial that has no breakpoints.
    #[error("Invalid partial: {0}")]
    InvalidPartial(String),

    #[error("Index out of bounds: {0}")]
    IndexOutOfBounds(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("SDIF library error -- {0}")]
    SdifLibrary(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,
}

impl CoreError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_object(msg: impl Into<String>) -> Self {
        Self::InvalidObject(msg.into())
    }

    pub fn invalid_partial(msg: impl Into<String>) -> Self {
        Self::InvalidPartial(msg.into())
    }

    /// True for `InvalidObject` and its `InvalidPartial` specialisation.
    pub fn is_invalid_object(&self) -> bool {
        matches!(self, Self::InvalidObject(_) | Self::InvalidPartial(_))
    }

    /// True for `FileIo`, `SdifLibrary` and raw `Io` errors.
    pub fn is_file_io(&self) -> bool {
        matches!(self, Self::FileIo(_) | Self::SdifLibrary(_) | Self::Io(_))
    }
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdif_message_prefix() {
        let err = CoreError::SdifLibrary("bad frame".into());
        assert_eq!(err.to_string(), "SDIF library error -- bad frame");
        assert!(err.is_file_io());
    }

    #[test]
    fn test_partial_is_invalid_object() {
        assert!(CoreError::invalid_partial("empty").is_invalid_object());
        assert!(!CoreError::invalid_argument("x").is_invalid_object());
    }
}
