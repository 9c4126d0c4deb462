//! SDIF error types

use rbe_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SdifError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed container: bad headers, sizes or data types
    #[error("SDIF library error -- {0}")]
    Library(String),

    /// Well-formed container with contents that cannot be imported
    #[error("File I/O error: {0}")]
    BadFormat(String),

    #[error("{0} Failed to read SDIF file.")]
    ReadFailed(#[source] Box<SdifError>),

    #[error("{0} Failed to write SDIF file.")]
    WriteFailed(#[source] Box<SdifError>),
}

impl SdifError {
    pub(crate) fn library(msg: impl Into<String>) -> Self {
        Self::Library(msg.into())
    }

    pub(crate) fn bad_format(msg: impl Into<String>) -> Self {
        Self::BadFormat(msg.into())
    }

    /// The innermost error, looking through read/write context.
    pub fn root(&self) -> &SdifError {
        match self {
            Self::ReadFailed(inner) | Self::WriteFailed(inner) => inner.root(),
            other => other,
        }
    }
}

pub type SdifResult<T> = Result<T, SdifError>;

impl From<SdifError> for CoreError {
    fn from(err: SdifError) -> Self {
        let is_library = matches!(err.root(), SdifError::Library(_));
        match err {
            SdifError::Core(e) => e,
            _ if is_library => {
                CoreError::SdifLibrary(err.to_string().replacen("SDIF library error -- ", "", 1))
            }
            other => CoreError::FileIo(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_context_suffix() {
        let err = SdifError::ReadFailed(Box::new(SdifError::library("Bad SDIF header")));
        assert_eq!(err.to_string(), "SDIF library error -- Bad SDIF header Failed to read SDIF file.");
        assert!(matches!(err.root(), SdifError::Library(_)));
    }

    #[test]
    fn test_into_core_error() {
        let err = SdifError::ReadFailed(Box::new(SdifError::library("Bad SDIF header")));
        let core: CoreError = err.into();
        assert!(core.is_file_io());
        assert_eq!(
            core.to_string(),
            "SDIF library error -- Bad SDIF header Failed to read SDIF file."
        );

        let core: CoreError = SdifError::bad_format("Markers frame has bad format.").into();
        assert!(matches!(core, CoreError::FileIo(_)));

        let core: CoreError = SdifError::Core(CoreError::Cancelled).into();
        assert!(matches!(core, CoreError::Cancelled));
    }
}
