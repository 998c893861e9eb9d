// SPDX-License-Identifier: MIT

//! First-fit search over the free space of a GPT disk.

use log::{debug, error};
use pavepart::GptEntry;
use pavepart::gpt::{GPT_PRIMARY_ENTRIES_LBA, entries_blocks};

use crate::error::{PaveError, PaveResult};

/// Bytes reserved for one copy of the partition entry array.
const RESERVED_ENTRY_BYTES: u64 = 16 * 1024;

/// Blocks held at each end of the disk for a GPT header and entry array.
#[inline]
pub const fn reserved_header_blocks(block_size: u64) -> u64 {
    (RESERVED_ENTRY_BYTES + 2 * block_size) / block_size
}

/// Blocks before the first usable LBA. Never less than the primary header
/// and entry array, which outgrow the reserved region on 32 KiB blocks.
#[inline]
fn head_blocks(block_size: u64) -> u64 {
    reserved_header_blocks(block_size).max(GPT_PRIMARY_ENTRIES_LBA + entries_blocks(block_size))
}

/// A run of blocks on the disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPosition {
    pub start_block: u64,
    pub length_blocks: u64,
}

impl PartitionPosition {
    #[inline]
    pub fn end_block(&self) -> u64 {
        self.start_block + self.length_blocks
    }
}

/// Finds the lowest-addressed free gap holding at least `bytes`.
///
/// Returns the whole gap. Both reserved regions count as occupied, and
/// every record is checked for overlap before any gap is chosen.
pub fn find_first_fit(
    entries: &[GptEntry],
    block_size: u64,
    block_count: u64,
    bytes: u64,
) -> PaveResult<PartitionPosition> {
    let blocks = bytes.div_ceil(block_size).max(1);
    let head = head_blocks(block_size);
    let tail = reserved_header_blocks(block_size);
    if block_count < head + tail {
        return Err(PaveError::NoResources(format!(
            "disk of {block_count} blocks has no usable space"
        )));
    }

    let mut occupied = Vec::with_capacity(entries.len() + 2);
    occupied.push(PartitionPosition {
        start_block: 0,
        length_blocks: head,
    });
    occupied.push(PartitionPosition {
        start_block: block_count - tail,
        length_blocks: tail,
    });
    for e in entries {
        let length_blocks = e.last_lba.saturating_sub(e.first_lba) + 1;
        debug!(
            "partition seen with start {}, end {} (length {length_blocks})",
            e.first_lba, e.last_lba
        );
        occupied.push(PartitionPosition {
            start_block: e.first_lba,
            length_blocks,
        });
    }
    occupied.sort_by_key(|p| p.start_block);

    for pair in occupied.windows(2) {
        let next = pair[0].start_block.saturating_add(pair[0].length_blocks);
        if next > pair[1].start_block {
            error!(
                "corrupted GPT: blocks [{}, {next}) run into block {}",
                pair[0].start_block, pair[1].start_block
            );
            return Err(PaveError::Io("corrupted GPT: overlapping extents".into()));
        }
    }

    for pair in occupied.windows(2) {
        let next = pair[0].start_block.saturating_add(pair[0].length_blocks);
        let free = pair[1].start_block - next;
        debug!("    {free} free blocks at {next} ({blocks} requested)");
        if free >= blocks {
            return Ok(PartitionPosition {
                start_block: next,
                length_blocks: free,
            });
        }
    }

    error!("no GPT space found for {blocks} blocks");
    Err(PaveError::NoResources(format!(
        "no free region of {blocks} blocks"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BS: u64 = 512;
    const COUNT: u64 = 1_000_000;

    fn part(first: u64, last: u64) -> GptEntry {
        GptEntry::new([1; 16], [first as u8; 16], first, last, 0, "p")
    }

    #[test]
    fn reserved_region_size() {
        assert_eq!(reserved_header_blocks(512), 34);
        assert_eq!(reserved_header_blocks(4096), 6);
        assert_eq!(reserved_header_blocks(32768), 2);
    }

    #[test]
    fn large_blocks_keep_clear_of_entry_array() {
        // The entry array still occupies LBA 2 when the reserved region
        // shrinks to two blocks.
        let pos = find_first_fit(&[], 32768, 1000, 1).unwrap();
        assert_eq!((pos.start_block, pos.length_blocks), (3, 995));
        assert_eq!(pavepart::gpt::usable_range(1000, 32768).unwrap().0, 3);
    }

    #[test]
    fn empty_disk_starts_after_header() {
        let pos = find_first_fit(&[], BS, COUNT, 1 << 20).unwrap();
        assert_eq!(pos.start_block, 34);
        assert_eq!(pos.length_blocks, COUNT - 68);
    }

    #[test]
    fn picks_lowest_gap_that_fits() {
        // Gaps: [34, 100) = 66 blocks, [200, 1000) = 800 blocks, then the tail.
        let parts = [part(1000, 1999), part(100, 199)];
        let pos = find_first_fit(&parts, BS, COUNT, 60 * BS).unwrap();
        assert_eq!((pos.start_block, pos.length_blocks), (34, 66));

        let pos = find_first_fit(&parts, BS, COUNT, 67 * BS).unwrap();
        assert_eq!((pos.start_block, pos.length_blocks), (200, 800));

        let pos = find_first_fit(&parts, BS, COUNT, 801 * BS).unwrap();
        assert_eq!(pos.start_block, 2000);
        assert_eq!(pos.end_block(), COUNT - 34);
    }

    #[test]
    fn bytes_round_up_to_blocks() {
        let parts = [part(100, 199)];
        // 66 blocks plus one byte no longer fits in the first gap.
        let pos = find_first_fit(&parts, BS, COUNT, 66 * BS + 1).unwrap();
        assert_eq!(pos.start_block, 200);
    }

    #[test]
    fn exhausted_disk() {
        let parts = [part(34, COUNT - 35)];
        assert!(matches!(
            find_first_fit(&parts, BS, COUNT, 1),
            Err(PaveError::NoResources(_))
        ));
        assert!(matches!(
            find_first_fit(&[], BS, COUNT, COUNT * BS),
            Err(PaveError::NoResources(_))
        ));
    }

    #[test]
    fn overlapping_records_are_corruption() {
        let parts = [part(100, 300), part(200, 400)];
        assert!(matches!(
            find_first_fit(&parts, BS, COUNT, 1 << 20),
            Err(PaveError::Io(_))
        ));
        // Overlap past a gap that already fits the request.
        let parts = [part(100, 199), part(5000, 6000), part(5500, 7000)];
        assert!(matches!(
            find_first_fit(&parts, BS, COUNT, 10 * BS),
            Err(PaveError::Io(_))
        ));
        // A record inside the reserved header is corruption as well.
        assert!(matches!(
            find_first_fit(&[part(10, 20)], BS, COUNT, 1),
            Err(PaveError::Io(_))
        ));
    }

    #[test]
    fn result_never_overlaps() {
        let parts = [part(34, 99), part(150, 160), part(400, 900), part(5000, 6000)];
        for blocks in [1, 10, 50, 51, 239, 240, 4099, 4100, 5000] {
            let pos = find_first_fit(&parts, BS, COUNT, blocks * BS).unwrap();
            assert!(pos.length_blocks >= blocks);
            for p in &parts {
                assert!(pos.end_block() <= p.first_lba || pos.start_block > p.last_lba);
            }
            assert!(pos.start_block >= 34 && pos.end_block() <= COUNT - 34);
        }
    }
}
