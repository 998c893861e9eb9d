// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for BlockIO operations.
pub type BlockIOResult<T = ()> = core::result::Result<T, BlockIOError>;

/// Error type for BlockIO operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockIOError {
    /// Host I/O failure, keeps the kind of the originating `std::io::Error`.
    Io(std::io::ErrorKind),
    /// Attempted to read or write outside the device.
    OutOfBounds,
    /// The device was opened read-only.
    ReadOnly,
    Unsupported,
    Invalid(&'static str),
    Other(&'static str),
}

impl BlockIOError {
    pub fn msg(&self) -> &'static str {
        match self {
            BlockIOError::Io(_) => "I/O error",
            BlockIOError::OutOfBounds => "Out of bounds",
            BlockIOError::ReadOnly => "Device is read-only",
            BlockIOError::Unsupported => "Unsupported operation",
            BlockIOError::Invalid(msg) => msg,
            BlockIOError::Other(msg) => msg,
        }
    }
}

impl From<&'static str> for BlockIOError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        BlockIOError::Other(msg)
    }
}

impl From<std::io::Error> for BlockIOError {
    #[cold]
    fn from(e: std::io::Error) -> Self {
        BlockIOError::Io(e.kind())
    }
}

impl fmt::Display for BlockIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockIOError::Io(kind) => write!(f, "I/O error: {kind}"),
            other => write!(f, "{}", other.msg()),
        }
    }
}

impl std::error::Error for BlockIOError {}
