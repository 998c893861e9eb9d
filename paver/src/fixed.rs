// SPDX-License-Identifier: MIT

//! Boards whose partitions are fixed nodes published by firmware.

use log::{error, info};
use pavepart::guids::*;

use crate::config::Timeouts;
use crate::device::DeviceDirectory;
use crate::error::{PaveError, PaveResult};
use crate::partitioner::DevicePartitioner;
use crate::role::PartitionRole;

pub struct FixedDevicePartitioner<D: DeviceDirectory> {
    dir: D,
    timeouts: Timeouts,
}

impl<D: DeviceDirectory> FixedDevicePartitioner<D> {
    /// Always succeeds; nodes are looked up lazily.
    pub fn initialize(dir: D, timeouts: Timeouts) -> Self {
        info!("initialized fixed device partitioner");
        Self { dir, timeouts }
    }

    /// Type GUID of the node backing `role`.
    pub fn role_type(role: PartitionRole) -> PaveResult<[u8; 16]> {
        match role {
            PartitionRole::KernelA => Ok(GPT_PARTITION_TYPE_ZIRCON_A),
            PartitionRole::KernelB => Ok(GPT_PARTITION_TYPE_ZIRCON_B),
            PartitionRole::KernelC => Ok(GPT_PARTITION_TYPE_ZIRCON_R),
            PartitionRole::FuchsiaVolumeManager => Ok(GPT_PARTITION_TYPE_FVM),
            other => {
                error!("fixed partitioner has no {other} partition");
                Err(PaveError::Unsupported(format!("{other} on fixed partitions")))
            }
        }
    }
}

impl<D: DeviceDirectory> DevicePartitioner<D> for FixedDevicePartitioner<D> {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn add_partition(&mut self, role: PartitionRole) -> PaveResult<D::Device> {
        Err(PaveError::Unsupported(format!(
            "cannot add {role}: partitions are fixed"
        )))
    }

    fn find_partition(&self, role: PartitionRole) -> PaveResult<D::Device> {
        let type_guid = Self::role_type(role)?;
        self.dir
            .open_partition(&type_guid, None, self.timeouts.bind, self.timeouts.poll)
            .map_err(|e| {
                error!("no {role} partition node: {e}");
                PaveError::NotFound(format!("{role} partition node"))
            })
    }

    fn finalize_partition(&mut self, _role: PartitionRole) -> PaveResult {
        Ok(())
    }

    fn wipe_partitions(&mut self, _roles: &[PartitionRole]) -> PaveResult {
        Err(PaveError::Unsupported(
            "cannot wipe: partitions are fixed".into(),
        ))
    }
}
