// SPDX-License-Identifier: MIT

//! On-disk GPT structures and the low-level codec: header geometry,
//! CRC32 of header and entry array, primary and backup placement.

use log::debug;
use paveio::prelude::*;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::guids::GptPartitionKind;
use crate::{errors::*, io_ext::BlockIOLbaExt, mbr};

pub const GPT_ENTRY_SIZE: usize = 128;
pub const GPT_PRIMARY_HEADER_LBA: u64 = 1;
pub const GPT_PRIMARY_ENTRIES_LBA: u64 = 2;
pub const GPT_MAX_PARTITIONS: usize = 128;
/// Bytes reserved for the partition entry array (128 * 128).
pub const GPT_ENTRIES_BYTES: u64 = (GPT_MAX_PARTITIONS * GPT_ENTRY_SIZE) as u64;
pub const GPT_NAME_LEN: usize = 36;
pub const GPT_SIGNATURE: &[u8; 8] = b"EFI PART";
pub const GPT_REVISION: u32 = 0x00010000;
pub const GPT_HEADER_SIZE: u32 = 92;

/// Blocks used by one copy of the entry array.
#[inline]
pub fn entries_blocks(block_size: u64) -> u64 {
    GPT_ENTRIES_BYTES.div_ceil(block_size)
}

pub fn encode_gpt_name(name: &str) -> [u16; GPT_NAME_LEN] {
    let mut buf = [0u16; GPT_NAME_LEN];
    for (i, c) in name.encode_utf16().take(GPT_NAME_LEN).enumerate() {
        buf[i] = c;
    }
    buf
}

/// Decodes a NUL-terminated UTF-16 name, replacing invalid code units.
pub fn decode_gpt_name(name: &[u16; GPT_NAME_LEN]) -> String {
    let end = name.iter().position(|&c| c == 0).unwrap_or(GPT_NAME_LEN);
    String::from_utf16_lossy(&name[..end])
}

#[inline]
fn crc32(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

#[inline]
fn compute_header_crc32(mut header: GptHeader) -> u32 {
    header.header_crc = 0;
    let size = (header.header_size as usize).min(size_of::<GptHeader>());
    crc32(&header.as_bytes()[..size])
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct GptEntry {
    pub type_guid: [u8; 16],
    pub unique_guid: [u8; 16],
    pub first_lba: u64,
    /// Inclusive.
    pub last_lba: u64,
    pub attributes: u64,
    pub name: [u16; GPT_NAME_LEN],
}

impl GptEntry {
    pub fn new(
        type_guid: [u8; 16],
        unique_guid: [u8; 16],
        first_lba: u64,
        last_lba: u64,
        attributes: u64,
        name: &str,
    ) -> Self {
        Self {
            type_guid,
            unique_guid,
            first_lba,
            last_lba,
            attributes,
            name: encode_gpt_name(name),
        }
    }

    #[inline]
    pub fn kind(&self) -> GptPartitionKind {
        GptPartitionKind::from_guid(&self.type_guid)
    }

    #[inline]
    pub fn name(&self) -> String {
        decode_gpt_name(&self.name)
    }

    #[inline]
    pub fn name_starts_with(&self, prefix: &str) -> bool {
        self.name().starts_with(prefix)
    }

    /// Length in blocks.
    #[inline]
    pub fn num_blocks(&self) -> u64 {
        self.last_lba.saturating_sub(self.first_lba) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.type_guid == [0; 16]
    }

    pub fn validate_basic(&self) -> PartResult {
        if self.is_empty() {
            return Ok(());
        }
        if self.last_lba < self.first_lba {
            return Err(PartError::Invalid("GPT: partition ends before it starts"));
        }
        Ok(())
    }

    pub fn validate_in_bounds(&self, first_usable: u64, last_usable: u64) -> PartResult {
        if self.is_empty() {
            return Ok(());
        }
        if self.first_lba < first_usable {
            return Err(PartError::OutOfRange(
                "GPT: partition starts before first usable LBA",
            ));
        }
        if self.last_lba > last_usable {
            return Err(PartError::OutOfRange(
                "GPT: partition ends after last usable LBA",
            ));
        }
        Ok(())
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C)]
pub struct GptHeader {
    pub signature: [u8; 8],
    pub revision: u32,
    pub header_size: u32,
    pub header_crc: u32,
    pub reserved: u32,
    pub current_lba: u64,
    pub backup_lba: u64,
    pub first_usable_lba: u64,
    pub last_usable_lba: u64,
    pub disk_guid: [u8; 16],
    pub entries_lba: u64,
    pub num_entries: u32,
    pub entry_size: u32,
    pub entries_crc: u32,
    pub reserved2: [u8; 420],
}

impl GptHeader {
    /// Primary header for a disk of `total_blocks`, entry array right after
    /// the header and usable space packed against both arrays.
    pub fn new_primary(total_blocks: u64, disk_guid: [u8; 16], block_size: u64) -> PartResult<Self> {
        let (first_usable_lba, last_usable_lba) = usable_range(total_blocks, block_size)?;

        Ok(Self {
            signature: *GPT_SIGNATURE,
            revision: GPT_REVISION,
            header_size: GPT_HEADER_SIZE,
            header_crc: 0,
            reserved: 0,
            current_lba: GPT_PRIMARY_HEADER_LBA,
            backup_lba: total_blocks - 1,
            first_usable_lba,
            last_usable_lba,
            disk_guid,
            entries_lba: GPT_PRIMARY_ENTRIES_LBA,
            num_entries: GPT_MAX_PARTITIONS as u32,
            entry_size: GPT_ENTRY_SIZE as u32,
            entries_crc: 0,
            reserved2: [0u8; 420],
        })
    }

    pub fn to_backup(mut self, total_blocks: u64, backup_entries_lba: u64) -> Self {
        self.current_lba = total_blocks - 1;
        self.backup_lba = GPT_PRIMARY_HEADER_LBA;
        self.entries_lba = backup_entries_lba;
        self.header_crc = compute_header_crc32(self);
        self
    }

    pub fn compute_crc32(&mut self, entries: &[GptEntry]) {
        self.entries_crc =
            compute_entries_crc32(entries, self.num_entries as usize, self.entry_size as usize);
        self.header_crc = compute_header_crc32(*self);
    }

    pub fn validate_header(&self) -> PartResult {
        if &self.signature != GPT_SIGNATURE {
            return Err(PartError::Invalid("GPT: invalid signature"));
        }
        if self.revision != GPT_REVISION {
            return Err(PartError::Invalid("GPT: unsupported revision"));
        }
        if self.header_size < GPT_HEADER_SIZE || self.header_size as usize > size_of::<GptHeader>() {
            return Err(PartError::Invalid("GPT: invalid header_size"));
        }
        if compute_header_crc32(*self) != self.header_crc {
            return Err(PartError::Invalid("GPT: header CRC mismatch"));
        }
        let base = size_of::<GptEntry>() as u32;
        if self.entry_size < base || (self.entry_size % 8) != 0 || self.entry_size > 512 {
            return Err(PartError::Invalid("GPT: invalid entry_size"));
        }
        if self.num_entries == 0 || self.num_entries > 16_384 {
            return Err(PartError::Invalid("GPT: num_entries out of range"));
        }
        if self.first_usable_lba > self.last_usable_lba {
            return Err(PartError::Invalid("GPT: empty usable range"));
        }
        Ok(())
    }

    /// Checks the entry-array CRC against the raw array bytes.
    pub fn validate_entries_crc(&self, raw: &[u8]) -> PartResult {
        if crc32(raw) != self.entries_crc {
            return Err(PartError::Invalid("GPT: entries CRC mismatch"));
        }
        Ok(())
    }

    pub fn validate_entries(&self, entries: &[GptEntry]) -> PartResult {
        for e in entries {
            e.validate_basic()?;
            e.validate_in_bounds(self.first_usable_lba, self.last_usable_lba)?;
        }
        Ok(())
    }
}

/// `(first_usable, last_usable)` for a disk of `total_blocks`.
pub fn usable_range(total_blocks: u64, block_size: u64) -> PartResult<(u64, u64)> {
    if block_size < 512 || !block_size.is_power_of_two() {
        return Err(PartError::Invalid("GPT: unsupported block size"));
    }
    let table = entries_blocks(block_size);
    let first = GPT_PRIMARY_ENTRIES_LBA + table;
    let last = total_blocks
        .checked_sub(2 + table)
        .ok_or(PartError::Invalid("GPT: disk too small (headers/tables)"))?;
    if first > last {
        return Err(PartError::Invalid("GPT: disk too small (headers/tables)"));
    }
    Ok((first, last))
}

#[inline]
fn overlaps_inclusive(a_start: u64, a_end: u64, b_start: u64, b_end: u64) -> bool {
    a_start <= b_end && b_start <= a_end
}

/// Fails with `PartError::Overlap` on the first pair of overlapping entries.
pub fn check_overlaps(entries: &[GptEntry]) -> PartResult {
    let mut segs: Vec<(u64, u64)> = entries
        .iter()
        .filter(|e| !e.is_empty())
        .map(|e| (e.first_lba, e.last_lba))
        .collect();

    if segs.len() <= 1 {
        return Ok(());
    }

    segs.sort_unstable_by_key(|s| s.0);

    for pair in segs.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if overlaps_inclusive(a.0, a.1, b.0, b.1) {
            return Err(PartError::Overlap {
                a_start: a.0,
                a_end: a.1,
                b_start: b.0,
                b_end: b.1,
            });
        }
    }
    Ok(())
}

fn encode_entries(entries: &[GptEntry], num_entries: usize, entry_size: usize) -> Vec<u8> {
    let base = size_of::<GptEntry>();
    let mut raw = vec![0u8; num_entries * entry_size];
    for (slot, e) in raw.chunks_exact_mut(entry_size).zip(entries) {
        slot[..base].copy_from_slice(e.as_bytes());
    }
    raw
}

fn compute_entries_crc32(entries: &[GptEntry], num_entries: usize, entry_size: usize) -> u32 {
    crc32(&encode_entries(entries, num_entries, entry_size))
}

fn decode_entries(raw: &[u8], entry_size: usize) -> PartResult<Vec<GptEntry>> {
    let base = size_of::<GptEntry>();
    let mut out = Vec::new();
    for slot in raw.chunks_exact(entry_size) {
        let e = GptEntry::read_from_bytes(&slot[..base])
            .map_err(|_| PartError::Invalid("GPT: invalid entry"))?;
        if !e.is_empty() {
            out.push(e);
        }
    }
    if out.len() > GPT_MAX_PARTITIONS {
        return Err(PartError::Invalid("GPT: too many partitions"));
    }
    Ok(out)
}

fn write_header<IO: BlockIO + ?Sized>(
    io: &mut IO,
    lba: u64,
    block_size: u64,
    header: &GptHeader,
) -> PartResult {
    let mut block = vec![0u8; block_size as usize];
    let bytes = header.as_bytes();
    let n = bytes.len().min(block.len());
    block[..n].copy_from_slice(&bytes[..n]);
    io.write_at_lba(lba, block_size, &block)?;
    Ok(())
}

/// Reads and fully validates the header stored at `lba` and its entry array.
pub fn read_gpt_at<IO: BlockIO + ?Sized>(
    io: &mut IO,
    lba: u64,
    block_size: u64,
) -> PartResult<(GptHeader, Vec<GptEntry>)> {
    let hdr: GptHeader = io.read_struct_lba(lba, block_size)?;
    hdr.validate_header()?;
    if hdr.current_lba != lba {
        return Err(PartError::Invalid("GPT: header LBA mismatch"));
    }

    let len = (hdr.num_entries as usize)
        .checked_mul(hdr.entry_size as usize)
        .ok_or(PartError::Invalid("GPT: entries byte length overflow"))?;
    let mut raw = vec![0u8; len];
    io.read_at_lba(hdr.entries_lba, block_size, &mut raw)?;
    hdr.validate_entries_crc(&raw)?;

    let entries = decode_entries(&raw, hdr.entry_size as usize)?;
    hdr.validate_entries(&entries)?;
    debug!(
        "GPT header at LBA {lba}: {} partition(s), usable {}..={}",
        entries.len(),
        hdr.first_usable_lba,
        hdr.last_usable_lba
    );
    Ok((hdr, entries))
}

/// Writes a protective MBR plus primary and backup GPT describing `entries`.
///
/// Entries are written as given; overlap checks are the caller's business.
pub fn write_gpt<IO: BlockIO + ?Sized>(
    io: &mut IO,
    entries: &[GptEntry],
    total_blocks: u64,
    disk_guid: [u8; 16],
    block_size: u64,
) -> PartResult {
    if entries.len() > GPT_MAX_PARTITIONS {
        return Err(PartError::Full);
    }
    let mut primary = GptHeader::new_primary(total_blocks, disk_guid, block_size)?;
    primary.compute_crc32(entries);

    let raw = encode_entries(entries, primary.num_entries as usize, primary.entry_size as usize);

    mbr::write_mbr_protective(io, total_blocks)?;
    io.write_at_lba(primary.entries_lba, block_size, &raw)?;
    write_header(io, GPT_PRIMARY_HEADER_LBA, block_size, &primary)?;

    let backup_entries_lba = (total_blocks - 1) - entries_blocks(block_size);
    let backup = primary.to_backup(total_blocks, backup_entries_lba);
    io.write_at_lba(backup_entries_lba, block_size, &raw)?;
    write_header(io, backup.current_lba, block_size, &backup)?;

    io.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: u64 = 512;

    #[test]
    fn layout_sizes() {
        assert_eq!(size_of::<GptEntry>(), GPT_ENTRY_SIZE);
        assert_eq!(size_of::<GptHeader>(), 512);
        assert_eq!(entries_blocks(512), 32);
        assert_eq!(entries_blocks(4096), 4);
    }

    #[test]
    fn usable_range_is_packed() {
        assert_eq!(usable_range(1_000_000, BS).unwrap(), (34, 999_966));
        assert_eq!(usable_range(1_000, 4096).unwrap(), (6, 994));
        assert!(usable_range(60, BS).is_err());
        assert!(usable_range(1_000, 1000).is_err());
    }

    #[test]
    fn write_and_parse_gpt() {
        let mut io = MemBlockIO::new(BS * 20_000);
        let part = GptEntry::new([1; 16], [2; 16], 2048, 4095, 0, "test");

        write_gpt(&mut io, &[part], 20_000, [0xAB; 16], BS).unwrap();

        let (header, parts) = read_gpt_at(&mut io, GPT_PRIMARY_HEADER_LBA, BS).unwrap();
        assert_eq!(header.signature, *GPT_SIGNATURE);
        assert_eq!(header.disk_guid, [0xAB; 16]);
        assert_eq!(parts, vec![part]);
        assert_eq!(parts[0].name(), "test");

        let (backup, parts) = read_gpt_at(&mut io, 19_999, BS).unwrap();
        assert_eq!(backup.backup_lba, GPT_PRIMARY_HEADER_LBA);
        assert_eq!(backup.entries_lba, 19_999 - 32);
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn corrupted_entries_fail_crc() {
        let mut io = MemBlockIO::new(BS * 20_000);
        let part = GptEntry::new([1; 16], [2; 16], 2048, 4095, 0, "test");
        write_gpt(&mut io, &[part], 20_000, [0xAB; 16], BS).unwrap();

        // Flip a bit in the first record's name.
        let mut byte = [0u8; 1];
        io.read_at(2 * BS + 56, &mut byte).unwrap();
        io.write_at(2 * BS + 56, &[byte[0] ^ 0x01]).unwrap();
        assert_eq!(
            read_gpt_at(&mut io, GPT_PRIMARY_HEADER_LBA, BS).unwrap_err(),
            PartError::Invalid("GPT: entries CRC mismatch")
        );
    }

    #[test]
    fn overlap_detection() {
        let p1 = GptEntry::new([1; 16], [2; 16], 2048, 4095, 0, "1");
        let p2 = GptEntry::new([3; 16], [4; 16], 3000, 5000, 0, "2");
        let p3 = GptEntry::new([3; 16], [5; 16], 4096, 5000, 0, "3");
        assert!(matches!(
            check_overlaps(&[p1, p2]),
            Err(PartError::Overlap { a_start: 2048, b_start: 3000, .. })
        ));
        assert!(check_overlaps(&[p1, p3]).is_ok());
    }

    #[test]
    fn names_are_truncated_and_decoded() {
        let long = "x".repeat(50);
        let e = GptEntry::new([1; 16], [2; 16], 34, 34, 0, &long);
        assert_eq!(e.name().len(), GPT_NAME_LEN);
        let e = GptEntry::new([1; 16], [2; 16], 34, 35, 0, "KERN-A");
        assert!(e.name_starts_with("KERN"));
        assert_eq!(e.num_blocks(), 2);
    }

    #[test]
    fn large_blocks_hold_a_full_header_block() {
        let mut io = MemBlockIO::new(4096 * 1_000);
        write_gpt(&mut io, &[], 1_000, [9; 16], 4096).unwrap();
        let (hdr, parts) = read_gpt_at(&mut io, 1, 4096).unwrap();
        assert_eq!(hdr.first_usable_lba, 6);
        assert!(parts.is_empty());
    }
}
