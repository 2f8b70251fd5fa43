use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlashError>;

/// Unified error type for flash device operations.
///
/// Every backend reports failures through this enum so callers that only hold a
/// `dyn FlashDevice` can react to them uniformly.
///
/// Note: the I/O variants store a human-readable `String` rather than
/// `std::io::Error` so the enum stays `Clone + PartialEq` and can be compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlashError {
    #[error("failed to open device: {0}")]
    Open(String),

    #[error("failed to close device: {0}")]
    Close(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write failed: {0}")]
    Write(String),

    #[error("erase failed: {0}")]
    Erase(String),

    #[error("out of bounds: offset={offset} len={len} capacity={capacity}")]
    OutOfBounds {
        offset: u64,
        len: u64,
        capacity: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl FlashError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlashError::Open(_) => ErrorKind::OpenError,
            FlashError::Close(_) => ErrorKind::CloseError,
            FlashError::Read(_) => ErrorKind::ReadError,
            FlashError::Write(_) => ErrorKind::WriteError,
            FlashError::Erase(_) => ErrorKind::EraseError,
            FlashError::OutOfBounds { .. } => ErrorKind::OutOfBounds,
            FlashError::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Coarse classification of a [`FlashError`].
///
/// `Display` yields the stable snake_case names used in reports (`out_of_bounds`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OpenError,
    CloseError,
    ReadError,
    WriteError,
    EraseError,
    OutOfBounds,
    InvalidConfig,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::OpenError => "open_error",
            ErrorKind::CloseError => "close_error",
            ErrorKind::ReadError => "read_error",
            ErrorKind::WriteError => "write_error",
            ErrorKind::EraseError => "erase_error",
            ErrorKind::OutOfBounds => "out_of_bounds",
            ErrorKind::InvalidConfig => "invalid_config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
