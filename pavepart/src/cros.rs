// SPDX-License-Identifier: MIT

//! ChromeOS kernel attribute bits and disk detection.
//!
//! Kernel entries carry their boot state in the GPT attribute word:
//! priority in bits 48..=51, tries in 52..=55, successful in bit 56.

use crate::errors::*;
use crate::gpt::GptEntry;
use crate::guids::{is_cros_kernel_partition, is_cros_rootfs_partition};
use crate::table::GptTable;

pub const PRIORITY_SHIFT: u32 = 48;
pub const TRIES_SHIFT: u32 = 52;
pub const SUCCESSFUL_SHIFT: u32 = 56;

pub const MAX_PRIORITY: u8 = 15;
pub const MAX_TRIES: u8 = 15;

const NIBBLE: u64 = 0xF;

#[inline]
fn get_field(attrs: u64, shift: u32) -> u8 {
    ((attrs >> shift) & NIBBLE) as u8
}

#[inline]
fn set_field(attrs: u64, shift: u32, value: u8) -> u64 {
    (attrs & !(NIBBLE << shift)) | ((value as u64 & NIBBLE) << shift)
}

pub fn get_priority(entry: &GptEntry) -> u8 {
    get_field(entry.attributes, PRIORITY_SHIFT)
}

pub fn set_priority(entry: &mut GptEntry, priority: u8) -> PartResult {
    if priority > MAX_PRIORITY {
        return Err(PartError::OutOfRange("ChromeOS: priority out of range"));
    }
    entry.attributes = set_field(entry.attributes, PRIORITY_SHIFT, priority);
    Ok(())
}

pub fn get_tries(entry: &GptEntry) -> u8 {
    get_field(entry.attributes, TRIES_SHIFT)
}

pub fn set_tries(entry: &mut GptEntry, tries: u8) -> PartResult {
    if tries > MAX_TRIES {
        return Err(PartError::OutOfRange("ChromeOS: tries out of range"));
    }
    entry.attributes = set_field(entry.attributes, TRIES_SHIFT, tries);
    Ok(())
}

pub fn get_successful(entry: &GptEntry) -> bool {
    entry.attributes & (1 << SUCCESSFUL_SHIFT) != 0
}

pub fn set_successful(entry: &mut GptEntry, successful: bool) {
    if successful {
        entry.attributes |= 1 << SUCCESSFUL_SHIFT;
    } else {
        entry.attributes &= !(1 << SUCCESSFUL_SHIFT);
    }
}

/// A ChromeOS disk has at least two kernel and two root partitions.
pub fn is_cros(table: &GptTable) -> bool {
    let parts = table.partitions();
    let kernels = parts.iter().filter(|e| is_cros_kernel_partition(e)).count();
    let roots = parts.iter().filter(|e| is_cros_rootfs_partition(e)).count();
    kernels >= 2 && roots >= 2
}
