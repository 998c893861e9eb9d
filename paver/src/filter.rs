// SPDX-License-Identifier: MIT

//! Named predicates over partition records.

use pavepart::GptEntry;
use pavepart::guids::{GPT_PARTITION_TYPE_CROS_KERNEL, GPT_PARTITION_TYPE_EFI};

/// GPT name given to EFI partitions created by the paver.
pub const EFI_NAME: &str = "EFI Gigaboot";
/// Name prefix of EFI partitions left by the legacy installer.
pub const LEGACY_EFI_NAME: &str = "EFI";
/// Legacy EFI partitions are only recognised above this size.
pub const LEGACY_EFI_MIN_BYTES: u64 = 1 << 29;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionFilter {
    /// Partition type GUID equals.
    Type([u8; 16]),
    /// ChromeOS kernel type and a slot name prefix such as "KERN-A".
    Kernel(&'static str),
    /// EFI type, named either "EFI Gigaboot..." or legacy "EFI..." and
    /// larger than 512 MiB.
    Efi,
    /// Any of the inner filters.
    Any(Vec<PartitionFilter>),
}

impl PartitionFilter {
    pub fn matches(&self, entry: &GptEntry, block_size: u64) -> bool {
        match self {
            PartitionFilter::Type(type_guid) => &entry.type_guid == type_guid,
            PartitionFilter::Kernel(slot) => {
                entry.type_guid == GPT_PARTITION_TYPE_CROS_KERNEL && entry.name_starts_with(slot)
            }
            PartitionFilter::Efi => {
                if entry.type_guid != GPT_PARTITION_TYPE_EFI {
                    return false;
                }
                let name = entry.name();
                let legacy = name.starts_with(LEGACY_EFI_NAME)
                    && entry.num_blocks().saturating_mul(block_size) > LEGACY_EFI_MIN_BYTES;
                legacy || name.starts_with(EFI_NAME)
            }
            PartitionFilter::Any(filters) => filters.iter().any(|f| f.matches(entry, block_size)),
        }
    }

    /// True if this filter can never match.
    pub fn is_empty(&self) -> bool {
        matches!(self, PartitionFilter::Any(filters) if filters.iter().all(|f| f.is_empty()))
    }
}
