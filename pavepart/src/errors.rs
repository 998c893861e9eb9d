// SPDX-License-Identifier: MIT

use core::fmt;

use paveio::errors::*;

/// Unified error type for partition table handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartError {
    IO(BlockIOError),
    Unsupported,
    NotFound,
    /// Every slot of the partition entry array is in use.
    Full,
    /// A value does not fit the field it is written to.
    OutOfRange(&'static str),
    Overlap {
        a_start: u64,
        a_end: u64,
        b_start: u64,
        b_end: u64,
    },
    Invalid(&'static str),
    Other(&'static str),
}

impl PartError {
    pub fn msg(&self) -> &'static str {
        match self {
            PartError::IO(e) => e.msg(),
            PartError::Unsupported => "Unsupported",
            PartError::NotFound => "Partition not found",
            PartError::Full => "GPT: no free partition entry",
            PartError::OutOfRange(msg) => msg,
            PartError::Overlap { .. } => "GPT: partition overlap detected",
            PartError::Invalid(msg) => msg,
            PartError::Other(msg) => msg,
        }
    }
}

impl From<&'static str> for PartError {
    fn from(s: &'static str) -> Self {
        PartError::Other(s)
    }
}

impl From<BlockIOError> for PartError {
    fn from(e: BlockIOError) -> Self {
        PartError::IO(e)
    }
}

impl fmt::Display for PartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartError::IO(e) => write!(f, "{e}"),
            PartError::Overlap {
                a_start,
                a_end,
                b_start,
                b_end,
            } => write!(
                f,
                "GPT: partition [{a_start}..={a_end}] overlaps [{b_start}..={b_end}]"
            ),
            other => write!(f, "{}", other.msg()),
        }
    }
}

impl std::error::Error for PartError {}

pub type PartResult<T = ()> = Result<T, PartError>;
