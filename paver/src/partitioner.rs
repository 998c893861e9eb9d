// SPDX-License-Identifier: MIT

//! The uniform role-based contract and the platform factory.

use log::{error, info, warn};
use paveio::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::PaverConfig;
use crate::cros::CrosDevicePartitioner;
use crate::device::DeviceDirectory;
use crate::efi::EfiDevicePartitioner;
use crate::error::{PaveError, PaveResult};
use crate::fixed::FixedDevicePartitioner;
use crate::role::PartitionRole;

/// What an installer sees, whatever the board's partitioning scheme.
pub trait DevicePartitioner<D: DeviceDirectory> {
    /// Short policy name for logs.
    fn name(&self) -> &'static str;

    /// Creates the partition for `role` and opens it.
    fn add_partition(&mut self, role: PartitionRole) -> PaveResult<D::Device>;

    /// Opens the existing partition for `role`.
    fn find_partition(&self, role: PartitionRole) -> PaveResult<D::Device>;

    /// Marks a freshly written partition as ready to boot.
    fn finalize_partition(&mut self, role: PartitionRole) -> PaveResult;

    /// Removes every partition backing one of `roles`.
    fn wipe_partitions(&mut self, roles: &[PartitionRole]) -> PaveResult;

    /// Geometry of an opened partition.
    fn block_info(&self, device: &D::Device) -> PaveResult<BlockInfo> {
        Ok(device.block_info()?)
    }

    /// Finds or creates the partition for `role`, writes `payload` at its
    /// start and finalizes it.
    fn pave(&mut self, role: PartitionRole, payload: &[u8]) -> PaveResult<BlockInfo> {
        let mut device = match self.find_partition(role) {
            Ok(device) => device,
            Err(PaveError::NotFound(_)) => {
                info!("no {role} partition yet, adding one");
                self.add_partition(role)?
            }
            Err(e) => return Err(e),
        };
        let info = self.block_info(&device)?;
        if payload.len() as u64 > info.size_bytes() {
            error!(
                "{role} payload of {} bytes exceeds partition of {} bytes",
                payload.len(),
                info.size_bytes()
            );
            return Err(PaveError::NoResources(format!(
                "payload does not fit the {role} partition"
            )));
        }
        device.write_in_chunks(0, payload, 1 << 20)?;
        device.flush()?;
        self.finalize_partition(role)?;
        info!("paved {} bytes into {role}", payload.len());
        Ok(info)
    }
}

/// CPU family that decides the probe order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    X64,
    Arm64,
}

impl Platform {
    /// The build target's platform, if it has a probe order.
    pub fn host() -> Option<Platform> {
        if cfg!(target_arch = "x86_64") {
            Some(Platform::X64)
        } else if cfg!(target_arch = "aarch64") {
            Some(Platform::Arm64)
        } else {
            None
        }
    }
}

/// Picks the partitioning policy for the configured platform.
///
/// x64 tries ChromeOS, then EFI; arm64 uses fixed partitions. `None` when
/// no policy initializes.
pub fn create<D>(dir: &D, config: &PaverConfig) -> Option<Box<dyn DevicePartitioner<D>>>
where
    D: DeviceDirectory + Clone + 'static,
{
    let timeouts = config.timeouts();
    let chosen: Option<Box<dyn DevicePartitioner<D>>> = match config.platform() {
        Some(Platform::X64) => match CrosDevicePartitioner::initialize(dir.clone(), timeouts) {
            Ok(cros) => Some(Box::new(cros)),
            Err(e) => {
                info!("ChromeOS partitioner unavailable: {e}");
                match EfiDevicePartitioner::initialize(dir.clone(), timeouts) {
                    Ok(efi) => Some(Box::new(efi)),
                    Err(e) => {
                        warn!("EFI partitioner unavailable: {e}");
                        None
                    }
                }
            }
        },
        Some(Platform::Arm64) => Some(Box::new(FixedDevicePartitioner::initialize(
            dir.clone(),
            timeouts,
        ))),
        None => None,
    };
    if chosen.is_none() {
        error!("no partitioner available");
    }
    chosen
}
