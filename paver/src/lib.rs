// SPDX-License-Identifier: MIT

//! Partition management for OS provisioning.
//!
//! A [`DevicePartitioner`] maps abstract roles (EFI loader, kernel slots,
//! volume manager, ...) onto the partitions of the target disk. Three
//! policies exist: generic EFI and ChromeOS boards share the GPT
//! primitives of [`gpt::GptDevicePartitioner`]; boards with firmware-fixed
//! partitions only look nodes up. [`partitioner::create`] picks one for
//! the platform.

pub mod config;
pub mod cros;
pub mod device;
pub mod efi;
pub mod error;
pub mod filter;
pub mod first_fit;
pub mod fixed;
pub mod gpt;
pub mod partitioner;
pub mod role;

pub use config::{PaverConfig, Timeouts};
pub use device::{DeviceDirectory, DeviceEntry, ImageDirectory, MemDirectory};
pub use error::{PaveError, PaveResult};
pub use filter::PartitionFilter;
pub use partitioner::{DevicePartitioner, Platform, create};
pub use role::{PartitionRole, RoleSpec};
