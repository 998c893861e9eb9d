// SPDX-License-Identifier: MIT

use core::fmt;
use std::str::FromStr;

use crate::error::PaveError;

/// Abstract partition an installer asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionRole {
    Efi,
    KernelA,
    KernelB,
    KernelC,
    FuchsiaVolumeManager,
    InstallType,
    System,
    Blob,
    Data,
}

impl PartitionRole {
    pub const ALL: [PartitionRole; 9] = [
        PartitionRole::Efi,
        PartitionRole::KernelA,
        PartitionRole::KernelB,
        PartitionRole::KernelC,
        PartitionRole::FuchsiaVolumeManager,
        PartitionRole::InstallType,
        PartitionRole::System,
        PartitionRole::Blob,
        PartitionRole::Data,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionRole::Efi => "efi",
            PartitionRole::KernelA => "kernel-a",
            PartitionRole::KernelB => "kernel-b",
            PartitionRole::KernelC => "kernel-c",
            PartitionRole::FuchsiaVolumeManager => "fvm",
            PartitionRole::InstallType => "install",
            PartitionRole::System => "system",
            PartitionRole::Blob => "blob",
            PartitionRole::Data => "data",
        }
    }
}

impl fmt::Display for PartitionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionRole {
    type Err = PaveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        PartitionRole::ALL
            .into_iter()
            .find(|role| role.as_str() == wanted)
            .ok_or_else(|| PaveError::Unsupported(format!("unknown partition role '{s}'")))
    }
}

/// How a policy lays out one role: type, GPT name and sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSpec {
    pub type_guid: [u8; 16],
    pub name: &'static str,
    pub minimum_size_bytes: u64,
    /// Free space to leave behind the partition, when the gap allows it.
    pub optional_reserve_bytes: u64,
}

impl RoleSpec {
    pub const fn new(type_guid: [u8; 16], name: &'static str, minimum_size_bytes: u64) -> Self {
        Self {
            type_guid,
            name,
            minimum_size_bytes,
            optional_reserve_bytes: 0,
        }
    }
}
