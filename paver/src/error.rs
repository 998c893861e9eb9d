// SPDX-License-Identifier: MIT

use paveio::errors::BlockIOError;
use pavepart::errors::PartError;
use thiserror::Error;

pub type PaveResult<T = ()> = std::result::Result<T, PaveError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaveError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("bad state: {0}")]
    BadState(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("no resources: {0}")]
    NoResources(String),

    #[error("out of memory")]
    NoMemory,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<BlockIOError> for PaveError {
    fn from(e: BlockIOError) -> Self {
        match e {
            BlockIOError::Unsupported => PaveError::Unsupported(e.to_string()),
            _ => PaveError::Io(e.to_string()),
        }
    }
}

impl From<PartError> for PaveError {
    fn from(e: PartError) -> Self {
        match e {
            PartError::IO(io) => io.into(),
            PartError::NotFound => PaveError::NotFound(e.to_string()),
            PartError::Unsupported => PaveError::Unsupported(e.to_string()),
            PartError::Full => PaveError::NoResources(e.to_string()),
            PartError::OutOfRange(_) => PaveError::OutOfRange(e.to_string()),
            PartError::Overlap { .. } | PartError::Invalid(_) => PaveError::BadState(e.to_string()),
            PartError::Other(_) => PaveError::Io(e.to_string()),
        }
    }
}

impl From<std::io::Error> for PaveError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => PaveError::NotFound(e.to_string()),
            std::io::ErrorKind::OutOfMemory => PaveError::NoMemory,
            _ => PaveError::Io(e.to_string()),
        }
    }
}
