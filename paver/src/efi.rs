// SPDX-License-Identifier: MIT

//! Generic EFI boards: one EFI system partition plus the FVM.

use log::{error, info};
use pavepart::cros::is_cros;
use pavepart::guids::*;

use crate::config::Timeouts;
use crate::device::DeviceDirectory;
use crate::error::{PaveError, PaveResult};
use crate::filter::{EFI_NAME, PartitionFilter};
use crate::gpt::GptDevicePartitioner;
use crate::partitioner::DevicePartitioner;
use crate::role::{PartitionRole, RoleSpec};

pub const FVM_NAME: &str = "fvm";

pub const EFI_SPEC: RoleSpec = RoleSpec::new(GPT_PARTITION_TYPE_EFI, EFI_NAME, 1 << 30);
pub const FVM_SPEC: RoleSpec = RoleSpec::new(GPT_PARTITION_TYPE_FVM, FVM_NAME, 8 << 30);

/// Type GUID wiped for the data-bearing roles every GPT policy shares.
pub(crate) fn wipe_type(role: PartitionRole) -> Option<[u8; 16]> {
    match role {
        PartitionRole::FuchsiaVolumeManager => Some(GPT_PARTITION_TYPE_FVM),
        PartitionRole::InstallType => Some(GPT_PARTITION_TYPE_INSTALL),
        PartitionRole::System => Some(GPT_PARTITION_TYPE_SYSTEM),
        PartitionRole::Blob => Some(GPT_PARTITION_TYPE_BLOB),
        PartitionRole::Data => Some(GPT_PARTITION_TYPE_DATA),
        _ => None,
    }
}

pub struct EfiDevicePartitioner<D: DeviceDirectory> {
    gpt: GptDevicePartitioner<D>,
}

impl<D: DeviceDirectory> EfiDevicePartitioner<D> {
    /// Claims the target disk unless it is laid out for ChromeOS.
    pub fn initialize(dir: D, timeouts: Timeouts) -> PaveResult<Self> {
        let gpt = GptDevicePartitioner::initialize_gpt(dir, timeouts)?;
        if is_cros(gpt.table()) {
            error!("disk is laid out for ChromeOS, use the ChromeOS partitioner");
            return Err(PaveError::Unsupported("ChromeOS disk".into()));
        }
        info!("initialized EFI device partitioner");
        Ok(Self { gpt })
    }

    pub fn gpt(&self) -> &GptDevicePartitioner<D> {
        &self.gpt
    }

    pub fn role_spec(role: PartitionRole) -> PaveResult<RoleSpec> {
        match role {
            PartitionRole::Efi => Ok(EFI_SPEC),
            PartitionRole::FuchsiaVolumeManager => Ok(FVM_SPEC),
            other => {
                error!("EFI partitioner cannot add {other} partitions");
                Err(PaveError::Unsupported(format!("{other} on EFI")))
            }
        }
    }

    fn filter(role: PartitionRole) -> PaveResult<PartitionFilter> {
        match role {
            PartitionRole::Efi => Ok(PartitionFilter::Efi),
            PartitionRole::FuchsiaVolumeManager => {
                Ok(PartitionFilter::Type(GPT_PARTITION_TYPE_FVM))
            }
            other => {
                error!("EFI partitioner cannot find {other} partitions");
                Err(PaveError::Unsupported(format!("{other} on EFI")))
            }
        }
    }
}

impl<D: DeviceDirectory> DevicePartitioner<D> for EfiDevicePartitioner<D> {
    fn name(&self) -> &'static str {
        "efi"
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

    fn finalize_partition(&mut self, _role: PartitionRole) -> PaveResult {
        Ok(())
    }

    fn wipe_partitions(&mut self, roles: &[PartitionRole]) -> PaveResult {
        let mut filters = Vec::with_capacity(roles.len());
        for &role in roles {
            match role {
                PartitionRole::Efi => filters.push(PartitionFilter::Efi),
                PartitionRole::KernelC => continue,
                other => match wipe_type(other) {
                    Some(type_guid) => filters.push(PartitionFilter::Type(type_guid)),
                    None => {
                        error!("EFI partitioner cannot wipe {other} partitions");
                        return Err(PaveError::Unsupported(format!("{other} on EFI")));
                    }
                },
            }
        }
        let filter = PartitionFilter::Any(filters);
        if filter.is_empty() {
            return Ok(());
        }
        self.gpt.wipe_partitions(&filter)
    }
}
