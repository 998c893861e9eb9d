// SPDX-License-Identifier: MIT

//! ChromeOS verified-boot disks: the OS boots from the KERN-C slot.

use log::{debug, error, info};
use paveio::prelude::*;
use pavepart::GptTable;
use pavepart::cros::{
    MAX_TRIES, get_priority, is_cros, set_priority, set_successful, set_tries,
};
use pavepart::guids::*;

use crate::config::Timeouts;
use crate::device::DeviceDirectory;
use crate::efi::{FVM_SPEC, wipe_type};
use crate::error::{PaveError, PaveResult};
use crate::filter::PartitionFilter;
use crate::first_fit::find_first_fit;
use crate::gpt::GptDevicePartitioner;
use crate::partitioner::DevicePartitioner;
use crate::role::{PartitionRole, RoleSpec};

pub const KERN_A_NAME: &str = "KERN-A";
pub const KERN_B_NAME: &str = "KERN-B";
pub const KERN_C_NAME: &str = "KERN-C";

pub const KERN_C_SPEC: RoleSpec =
    RoleSpec::new(GPT_PARTITION_TYPE_CROS_KERNEL, KERN_C_NAME, 64 << 20);

/// Prepares a ChromeOS disk to take this OS.
pub trait CrosLayout {
    fn is_ready_to_pave(&self, table: &GptTable, info: &BlockInfo) -> bool;

    fn configure(&self, table: &mut GptTable, info: &BlockInfo) -> PaveResult;
}

/// Default layout: a KERN-C kernel slot of at least `kernel_bytes`.
///
/// Missing slots are carved from free space; existing partitions are never
/// resized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromeOsDiskSetup {
    pub kernel_bytes: u64,
}

impl Default for ChromeOsDiskSetup {
    fn default() -> Self {
        Self {
            kernel_bytes: KERN_C_SPEC.minimum_size_bytes,
        }
    }
}

impl ChromeOsDiskSetup {
    fn kern_c(table: &GptTable, block_size: u64) -> Option<pavepart::GptEntry> {
        let filter = PartitionFilter::Kernel(KERN_C_NAME);
        table
            .partitions()
            .iter()
            .find(|e| filter.matches(e, block_size))
            .copied()
    }
}

impl CrosLayout for ChromeOsDiskSetup {
    fn is_ready_to_pave(&self, table: &GptTable, info: &BlockInfo) -> bool {
        let bs = info.block_size as u64;
        Self::kern_c(table, bs)
            .is_some_and(|e| e.num_blocks().saturating_mul(bs) >= self.kernel_bytes)
    }

    fn configure(&self, table: &mut GptTable, info: &BlockInfo) -> PaveResult {
        let bs = info.block_size as u64;
        if let Some(existing) = Self::kern_c(table, bs) {
            error!(
                "{KERN_C_NAME} holds {} bytes, {} needed, and cannot be resized",
                existing.num_blocks() * bs,
                self.kernel_bytes
            );
            return Err(PaveError::NoResources(format!(
                "{KERN_C_NAME} too small"
            )));
        }
        let position = find_first_fit(table.partitions(), bs, info.block_count, self.kernel_bytes)?;
        let blocks = info.blocks_for(self.kernel_bytes).max(1);
        table.add_partition(
            KERN_C_NAME,
            GPT_PARTITION_TYPE_CROS_KERNEL,
            random_guid(),
            position.start_block,
            blocks,
            0,
        )?;
        info!("configured ChromeOS disk with {KERN_C_NAME} at block {}", position.start_block);
        Ok(())
    }
}

pub struct CrosDevicePartitioner<D: DeviceDirectory> {
    gpt: GptDevicePartitioner<D>,
}

impl<D: DeviceDirectory> CrosDevicePartitioner<D> {
    pub fn initialize(dir: D, timeouts: Timeouts) -> PaveResult<Self> {
        Self::initialize_with(dir, timeouts, &ChromeOsDiskSetup::default())
    }

    /// Claims the target disk if it is a ChromeOS disk, laying out the
    /// kernel slot with `layout` when missing.
    pub fn initialize_with(
        dir: D,
        timeouts: Timeouts,
        layout: &dyn CrosLayout,
    ) -> PaveResult<Self> {
        let mut gpt = GptDevicePartitioner::initialize_gpt(dir, timeouts)?;
        if !is_cros(gpt.table()) {
            return Err(PaveError::NotFound("not a ChromeOS disk".into()));
        }

        let info = gpt.block_info();
        if !layout.is_ready_to_pave(gpt.table(), &info) {
            layout.configure(gpt.table_mut(), &info).map_err(|e| {
                error!("failed to configure ChromeOS disk: {e}");
                e
            })?;
            gpt.sync()?;
            gpt.rescan()?;
        }

        info!("initialized ChromeOS device partitioner");
        Ok(Self { gpt })
    }

    pub fn gpt(&self) -> &GptDevicePartitioner<D> {
        &self.gpt
    }

    pub fn role_spec(role: PartitionRole) -> PaveResult<RoleSpec> {
        match role {
            PartitionRole::KernelC => Ok(KERN_C_SPEC),
            PartitionRole::FuchsiaVolumeManager => Ok(FVM_SPEC),
            other => {
                error!("ChromeOS partitioner cannot add {other} partitions");
                Err(PaveError::Unsupported(format!("{other} on ChromeOS")))
            }
        }
    }

    fn filter(role: PartitionRole) -> PaveResult<PartitionFilter> {
        match role {
            PartitionRole::KernelA => Ok(PartitionFilter::Kernel(KERN_A_NAME)),
            PartitionRole::KernelB => Ok(PartitionFilter::Kernel(KERN_B_NAME)),
            PartitionRole::KernelC => Ok(PartitionFilter::Kernel(KERN_C_NAME)),
            PartitionRole::FuchsiaVolumeManager => {
                Ok(PartitionFilter::Type(GPT_PARTITION_TYPE_FVM))
            }
            other => {
                error!("ChromeOS partitioner cannot find {other} partitions");
                Err(PaveError::Unsupported(format!("{other} on ChromeOS")))
            }
        }
    }

    fn slot(&self, name: &'static str) -> PaveResult<pavepart::GptEntry> {
        self.gpt
            .find_partition(&PartitionFilter::Kernel(name))
            .inspect_err(|_| error!("cannot find {name} partition"))
    }
}

impl<D: DeviceDirectory> DevicePartitioner<D> for CrosDevicePartitioner<D> {
    fn name(&self) -> &'static str {
        "cros"
    }

    fn add_partition(&mut self, role: PartitionRole) -> PaveResult<D::Device> {
        let spec = Self::role_spec(role)?;
        self.gpt.add_partition(
            spec.name,
            spec.type_guid,
            spec.minimum_size_bytes,
            spec.optional_reserve_bytes,
        )
    }

    fn find_partition(&self, role: PartitionRole) -> PaveResult<D::Device> {
        self.gpt.find_partition_device(&Self::filter(role)?)
    }

    /// Gives KERN-C a priority above both other slots so firmware boots it.
    fn finalize_partition(&mut self, role: PartitionRole) -> PaveResult {
        if role != PartitionRole::KernelC {
            return Ok(());
        }

        let priority_a = get_priority(&self.slot(KERN_A_NAME)?);
        let priority_b = get_priority(&self.slot(KERN_B_NAME)?);
        let kern_c = self.slot(KERN_C_NAME)?;

        let priority_c = priority_a
            .max(priority_b)
            .checked_add(1)
            .ok_or_else(|| PaveError::OutOfRange("kernel priority overflow".into()))?;
        if priority_c <= get_priority(&kern_c) {
            debug!("{KERN_C_NAME} priority already high enough");
            return Ok(());
        }

        let entry = self
            .gpt
            .table_mut()
            .partition_mut(&kern_c.unique_guid)
            .ok_or_else(|| PaveError::NotFound(format!("{KERN_C_NAME} vanished")))?;
        set_priority(entry, priority_c).map_err(|e| {
            error!("cannot set {KERN_C_NAME} priority to {priority_c}: {e}");
            PaveError::from(e)
        })?;
        set_successful(entry, true);
        set_tries(entry, MAX_TRIES)?;

        self.gpt.sync()?;
        info!("{KERN_C_NAME} set to priority {priority_c}");
        Ok(())
    }

    fn wipe_partitions(&mut self, roles: &[PartitionRole]) -> PaveResult {
        let mut filters = Vec::with_capacity(roles.len());
        for &role in roles {
            match role {
                PartitionRole::Efi => continue,
                other => match wipe_type(other) {
                    Some(type_guid) => filters.push(PartitionFilter::Type(type_guid)),
                    None => {
                        error!("ChromeOS partitioner cannot wipe {other} partitions");
                        return Err(PaveError::Unsupported(format!("{other} on ChromeOS")));
                    }
                },
            }
        }
        self.gpt.wipe_partitions(&PartitionFilter::Any(filters))
    }
}
