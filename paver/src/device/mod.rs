// SPDX-License-Identifier: MIT

//! The block device class directory: enumerable nodes for whole disks and
//! their partitions.

use std::thread;
use std::time::{Duration, Instant};

use log::debug;
use paveio::prelude::*;
use pavepart::guids::format_guid;

use crate::error::{PaveError, PaveResult};

mod image;
mod mem;

pub use image::{ImageDevice, ImageDirectory};
pub use mem::{MemDevice, MemDirectory};

/// Topological path component that marks a partition node.
pub const PARTITION_PATH_MARKER: &str = "part-";

/// Identity of a partition node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionIdent {
    pub type_guid: [u8; 16],
    pub unique_guid: [u8; 16],
}

/// One node of the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEntry {
    pub name: String,
    pub topological_path: String,
    pub info: BlockInfo,
    /// Set for partition nodes.
    pub partition: Option<PartitionIdent>,
}

impl DeviceEntry {
    #[inline]
    pub fn is_partition(&self) -> bool {
        self.partition.is_some()
    }

    fn matches(&self, type_guid: &[u8; 16], unique_guid: Option<&[u8; 16]>) -> bool {
        match &self.partition {
            Some(ident) => {
                &ident.type_guid == type_guid
                    && unique_guid.is_none_or(|guid| &ident.unique_guid == guid)
            }
            None => false,
        }
    }
}

/// Source of block devices.
pub trait DeviceDirectory {
    type Device: BlockDevice;

    /// Current nodes, in directory order.
    fn list(&self) -> PaveResult<Vec<DeviceEntry>>;

    fn open(&self, name: &str) -> PaveResult<Self::Device>;

    /// First partition node with `type_guid` (and `unique_guid`, when given).
    fn find_partition_node(
        &self,
        type_guid: &[u8; 16],
        unique_guid: Option<&[u8; 16]>,
    ) -> PaveResult<Option<DeviceEntry>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|entry| entry.matches(type_guid, unique_guid)))
    }

    /// Waits up to `timeout` for a matching partition node, then opens it.
    fn open_partition(
        &self,
        type_guid: &[u8; 16],
        unique_guid: Option<&[u8; 16]>,
        timeout: Duration,
        poll: Duration,
    ) -> PaveResult<Self::Device> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(entry) = self.find_partition_node(type_guid, unique_guid)? {
                debug!("partition node {} bound", entry.topological_path);
                return self.open(&entry.name);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PaveError::NotFound(format!(
                    "no partition node of type {} after {timeout:?}",
                    format_guid(type_guid)
                )));
            }
            thread::sleep(poll.min(deadline - now));
        }
    }
}
