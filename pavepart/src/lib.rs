// SPDX-License-Identifier: MIT

#[macro_use]
mod macros;

pub mod errors;
/// GUID Partition Table (GPT) on-disk codec.
pub mod gpt;
/// Partition type GUIDs known to the paver.
pub mod guids;
pub mod io_ext;
/// Protective MBR.
pub mod mbr;
/// In-memory partition table.
pub mod table;
/// ChromeOS kernel attributes.
pub mod cros;

pub use errors::{PartError, PartResult};
pub use gpt::GptEntry;
pub use table::GptTable;
