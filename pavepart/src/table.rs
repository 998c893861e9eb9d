// SPDX-License-Identifier: MIT

//! In-memory GPT: load from a device, mutate, persist.

use log::{debug, info, warn};
use paveio::prelude::*;

use crate::errors::*;
use crate::gpt::*;
use crate::guids::random_guid;
use crate::io_ext::BlockIOLbaExt;

/// A loaded GUID partition table.
///
/// Records are kept in slot order. Removing a record compacts the slots
/// behind it, so callers key records by unique GUID rather than by index.
#[derive(Debug, Clone)]
pub struct GptTable {
    block_size: u64,
    block_count: u64,
    disk_guid: [u8; 16],
    first_usable: u64,
    last_usable: u64,
    entries: Vec<GptEntry>,
    valid: bool,
}

impl GptTable {
    /// An empty table for the given geometry. Not valid until synced.
    pub fn new_empty(block_size: u64, block_count: u64) -> PartResult<Self> {
        let (first_usable, last_usable) = usable_range(block_count, block_size)?;
        Ok(Self {
            block_size,
            block_count,
            disk_guid: random_guid(),
            first_usable,
            last_usable,
            entries: Vec::new(),
            valid: false,
        })
    }

    /// Reads the GPT from `io`, falling back to the backup header.
    ///
    /// A disk with neither header intact yields an invalid, empty table
    /// rather than an error; I/O failures are still reported.
    pub fn load<IO: BlockIO + ?Sized>(
        io: &mut IO,
        block_size: u64,
        block_count: u64,
    ) -> PartResult<Self> {
        let mut table = Self::new_empty(block_size, block_count)?;

        let loaded = match read_gpt_at(io, GPT_PRIMARY_HEADER_LBA, block_size) {
            Ok(found) => Some(found),
            Err(PartError::IO(e)) => return Err(PartError::IO(e)),
            Err(primary) => {
                debug!("primary GPT header rejected: {primary}");
                match read_gpt_at(io, block_count - 1, block_size) {
                    Ok(found) => {
                        warn!("primary GPT header damaged ({primary}), using backup");
                        Some(found)
                    }
                    Err(PartError::IO(e)) => return Err(PartError::IO(e)),
                    Err(backup) => {
                        debug!("backup GPT header rejected: {backup}");
                        None
                    }
                }
            }
        };

        if let Some((hdr, entries)) = loaded {
            if hdr.last_usable_lba >= block_count {
                warn!("GPT describes a larger disk than the device, ignoring it");
                return Ok(table);
            }
            table.disk_guid = hdr.disk_guid;
            table.first_usable = hdr.first_usable_lba.max(table.first_usable);
            table.last_usable = hdr.last_usable_lba.min(table.last_usable);
            table.entries = entries;
            table.valid = true;
        }
        Ok(table)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    #[inline]
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    #[inline]
    pub fn disk_guid(&self) -> [u8; 16] {
        self.disk_guid
    }

    #[inline]
    pub fn first_usable(&self) -> u64 {
        self.first_usable
    }

    #[inline]
    pub fn last_usable(&self) -> u64 {
        self.last_usable
    }

    /// Populated records in slot order.
    #[inline]
    pub fn partitions(&self) -> &[GptEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_guid(&self, unique_guid: &[u8; 16]) -> Option<&GptEntry> {
        self.entries.iter().find(|e| &e.unique_guid == unique_guid)
    }

    pub fn partition_mut(&mut self, unique_guid: &[u8; 16]) -> Option<&mut GptEntry> {
        self.entries.iter_mut().find(|e| &e.unique_guid == unique_guid)
    }

    /// Inserts a record covering `[first, first + blocks)`.
    pub fn add_partition(
        &mut self,
        name: &str,
        type_guid: [u8; 16],
        unique_guid: [u8; 16],
        first: u64,
        blocks: u64,
        attributes: u64,
    ) -> PartResult {
        if blocks == 0 {
            return Err(PartError::Invalid("GPT: zero-sized partition"));
        }
        if type_guid == [0; 16] {
            return Err(PartError::Invalid("GPT: empty partition type"));
        }
        if self.entries.len() >= GPT_MAX_PARTITIONS {
            return Err(PartError::Full);
        }
        if self.by_guid(&unique_guid).is_some() {
            return Err(PartError::Invalid("GPT: duplicate unique GUID"));
        }
        let last = first
            .checked_add(blocks - 1)
            .ok_or(PartError::OutOfRange("GPT: LBA overflow"))?;

        let entry = GptEntry::new(type_guid, unique_guid, first, last, attributes, name);
        entry.validate_in_bounds(self.first_usable, self.last_usable)?;
        for other in &self.entries {
            check_overlaps(&[*other, entry])?;
        }

        info!("GPT: adding \"{name}\" at blocks {first}..={last}");
        self.entries.push(entry);
        Ok(())
    }

    /// Removes the slot holding exactly `entry`, compacting the slots after
    /// it. Another slot sharing its unique GUID is left alone.
    pub fn remove_entry(&mut self, entry: &GptEntry) -> PartResult<GptEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e == entry)
            .ok_or(PartError::NotFound)?;
        let removed = self.entries.remove(index);
        info!(
            "GPT: removed \"{}\" at blocks {}..={}",
            removed.name(),
            removed.first_lba,
            removed.last_lba
        );
        Ok(removed)
    }

    pub fn remove_all(&mut self) {
        self.entries.clear();
    }

    /// Persists the table (protective MBR, primary and backup copies).
    pub fn sync<IO: BlockIO + ?Sized>(&mut self, io: &mut IO) -> PartResult {
        write_gpt(
            io,
            &self.entries,
            self.block_count,
            self.disk_guid,
            self.block_size,
        )?;
        // A sync always lays down the canonical geometry.
        let (first, last) = usable_range(self.block_count, self.block_size)?;
        self.first_usable = first;
        self.last_usable = last;
        self.valid = true;
        debug!("GPT: synced {} partition(s)", self.entries.len());
        Ok(())
    }

    /// Zeroes `blocks` blocks starting at `first`.
    pub fn clear<IO: BlockIO + ?Sized>(&self, io: &mut IO, first: u64, blocks: u64) -> PartResult {
        let end = first
            .checked_add(blocks)
            .ok_or(PartError::OutOfRange("GPT: LBA overflow"))?;
        if end > self.block_count {
            return Err(PartError::OutOfRange("GPT: clear past end of disk"));
        }
        io.zero_lba(first, self.block_size, blocks)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guids::*;

    const BS: u64 = 512;
    const COUNT: u64 = 100_000;

    fn disk() -> MemBlockIO {
        MemBlockIO::new(BS * COUNT)
    }

    #[test]
    fn blank_disk_loads_invalid() {
        let mut io = disk();
        let table = GptTable::load(&mut io, BS, COUNT).unwrap();
        assert!(!table.is_valid());
        assert!(table.is_empty());
        assert_eq!(table.first_usable(), 34);
        assert_eq!(table.last_usable(), COUNT - 34);
    }

    #[test]
    fn add_sync_reload() {
        let mut io = disk();
        let mut table = GptTable::load(&mut io, BS, COUNT).unwrap();
        table
            .add_partition("fvm", GPT_PARTITION_TYPE_FVM, [7; 16], 34, 1000, 0)
            .unwrap();
        table.sync(&mut io).unwrap();
        assert!(table.is_valid());

        let reloaded = GptTable::load(&mut io, BS, COUNT).unwrap();
        assert!(reloaded.is_valid());
        assert_eq!(reloaded.disk_guid(), table.disk_guid());
        let e = reloaded.by_guid(&[7; 16]).unwrap();
        assert_eq!((e.first_lba, e.last_lba), (34, 1033));
        assert_eq!(e.name(), "fvm");
    }

    #[test]
    fn add_rejects_bad_requests() {
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        let t = GPT_PARTITION_TYPE_DATA;
        table.add_partition("a", t, [1; 16], 100, 100, 0).unwrap();

        assert!(matches!(
            table.add_partition("b", t, [2; 16], 150, 10, 0),
            Err(PartError::Overlap { .. })
        ));
        assert!(matches!(
            table.add_partition("b", t, [2; 16], 10, 10, 0),
            Err(PartError::OutOfRange(_))
        ));
        assert!(matches!(
            table.add_partition("b", t, [2; 16], COUNT - 40, 10, 0),
            Err(PartError::OutOfRange(_))
        ));
        assert!(matches!(
            table.add_partition("b", t, [1; 16], 500, 10, 0),
            Err(PartError::Invalid(_))
        ));
        assert!(matches!(
            table.add_partition("b", t, [2; 16], 500, 0, 0),
            Err(PartError::Invalid(_))
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn table_fills_up() {
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        for i in 0..GPT_MAX_PARTITIONS as u64 {
            let mut guid = [0u8; 16];
            guid[..8].copy_from_slice(&(i + 1).to_le_bytes());
            table
                .add_partition("p", GPT_PARTITION_TYPE_DATA, guid, 100 + i * 10, 10, 0)
                .unwrap();
        }
        assert_eq!(
            table.add_partition("p", GPT_PARTITION_TYPE_DATA, [0xEE; 16], 5000, 10, 0),
            Err(PartError::Full)
        );
    }

    #[test]
    fn remove_compacts_slots() {
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        let t = GPT_PARTITION_TYPE_BLOB;
        table.add_partition("a", t, [1; 16], 100, 10, 0).unwrap();
        table.add_partition("b", t, [2; 16], 200, 10, 0).unwrap();
        table.add_partition("c", t, [3; 16], 300, 10, 0).unwrap();

        let b = *table.by_guid(&[2; 16]).unwrap();
        assert_eq!(table.remove_entry(&b).unwrap().name(), "b");
        let names: Vec<_> = table.partitions().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(table.remove_entry(&b), Err(PartError::NotFound));

        table.remove_all();
        assert!(table.is_empty());
    }

    #[test]
    fn backup_header_recovers_damaged_primary() {
        let mut io = disk();
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        table
            .add_partition("data", GPT_PARTITION_TYPE_DATA, [4; 16], 34, 64, 0)
            .unwrap();
        table.sync(&mut io).unwrap();

        // Smash the primary header signature.
        io.write_at(BS, b"NOT PART").unwrap();
        let loaded = GptTable::load(&mut io, BS, COUNT).unwrap();
        assert!(loaded.is_valid());
        assert!(loaded.by_guid(&[4; 16]).is_some());

        io.write_at((COUNT - 1) * BS, b"NOT PART").unwrap();
        let loaded = GptTable::load(&mut io, BS, COUNT).unwrap();
        assert!(!loaded.is_valid());
        assert!(loaded.is_empty());
    }

    #[test]
    fn overlapping_records_still_load() {
        let mut io = disk();
        let a = GptEntry::new(GPT_PARTITION_TYPE_DATA, [1; 16], 100, 300, 0, "a");
        let b = GptEntry::new(GPT_PARTITION_TYPE_DATA, [2; 16], 200, 400, 0, "b");
        write_gpt(&mut io, &[a, b], COUNT, [5; 16], BS).unwrap();

        let loaded = GptTable::load(&mut io, BS, COUNT).unwrap();
        assert!(loaded.is_valid());
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn remove_entry_spares_guid_twin() {
        let mut io = disk();
        let keep = GptEntry::new(GPT_PARTITION_TYPE_DATA, [7; 16], 100, 199, 0, "keep");
        let doomed = GptEntry::new(GPT_PARTITION_TYPE_BLOB, [7; 16], 300, 399, 0, "doomed");
        write_gpt(&mut io, &[keep, doomed], COUNT, [5; 16], BS).unwrap();

        let mut table = GptTable::load(&mut io, BS, COUNT).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.remove_entry(&doomed).unwrap().name(), "doomed");
        assert_eq!(table.partitions(), [keep]);
        assert_eq!(table.remove_entry(&doomed), Err(PartError::NotFound));
    }

    #[test]
    fn clear_zeroes_blocks() {
        let mut io = disk();
        io.write_at(500 * BS, &[0xAB; 1024]).unwrap();
        let table = GptTable::new_empty(BS, COUNT).unwrap();
        table.clear(&mut io, 500, 1).unwrap();

        let mut buf = [0xFFu8; 1024];
        io.read_at(500 * BS, &mut buf).unwrap();
        assert_eq!(buf[..512], [0u8; 512]);
        assert_eq!(buf[512..], [0xABu8; 512]);
        assert!(table.clear(&mut io, COUNT - 1, 2).is_err());
    }

    #[test]
    fn mutate_attributes_in_place() {
        let mut table = GptTable::new_empty(BS, COUNT).unwrap();
        table
            .add_partition("k", GPT_PARTITION_TYPE_CROS_KERNEL, [9; 16], 100, 10, 0)
            .unwrap();
        table.partition_mut(&[9; 16]).unwrap().attributes = 0x42;
        assert_eq!(table.by_guid(&[9; 16]).unwrap().attributes, 0x42);
        assert!(table.partition_mut(&[8; 16]).is_none());
    }
}
