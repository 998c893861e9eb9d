// SPDX-License-Identifier: MIT

//! Protective MBR written in front of every GPT.

use paveio::prelude::*;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::*;

pub const MBR_SIGNATURE: [u8; 2] = [0x55, 0xAA];
pub const PROTECTIVE_GPT: u8 = 0xEE;

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C, packed)]
pub struct MbrEntry {
    pub boot_flag: u8,
    pub starting_chs: [u8; 3],
    pub part_type: u8,
    pub end_chs: [u8; 3],
    pub start_lba: u32,
    pub sectors: u32,
}

impl MbrEntry {
    #[inline]
    pub fn new_empty() -> Self {
        Self {
            boot_flag: 0,
            starting_chs: [0; 3],
            part_type: 0,
            end_chs: [0; 3],
            start_lba: 0,
            sectors: 0,
        }
    }

    /// A single 0xEE entry covering the disk (clamped to the 32-bit field).
    #[inline]
    pub fn new_protective(total_blocks: u64) -> Self {
        let sectors = total_blocks.saturating_sub(1).min(u32::MAX as u64) as u32;
        Self {
            boot_flag: 0x00,
            starting_chs: [0x00, 0x02, 0x00],
            part_type: PROTECTIVE_GPT,
            end_chs: [0xFE, 0xFF, 0xFF],
            start_lba: 1u32.to_le(),
            sectors: sectors.to_le(),
        }
    }

    #[inline]
    pub fn is_protective(&self) -> bool {
        self.part_type == PROTECTIVE_GPT
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct Mbr {
    pub boot_code: [u8; 446],
    pub entries: [MbrEntry; 4],
    pub signature: [u8; 2],
}

impl Mbr {
    pub fn new_protective(total_blocks: u64) -> Self {
        let mut entries = [MbrEntry::new_empty(); 4];
        entries[0] = MbrEntry::new_protective(total_blocks);
        Self {
            boot_code: [0u8; 446],
            entries,
            signature: MBR_SIGNATURE,
        }
    }

    #[inline]
    pub fn has_valid_signature(&self) -> bool {
        self.signature == MBR_SIGNATURE
    }

    #[inline]
    pub fn is_protective(&self) -> bool {
        let first = self.entries[0];
        self.has_valid_signature() && first.is_protective()
    }
}

pub fn write_mbr_protective<IO: BlockIO + ?Sized>(io: &mut IO, total_blocks: u64) -> PartResult {
    io.write_struct(0, &Mbr::new_protective(total_blocks))?;
    Ok(())
}

pub fn read_mbr<IO: BlockIO + ?Sized>(io: &mut IO) -> PartResult<Mbr> {
    Ok(io.read_struct::<Mbr>(0)?)
}
