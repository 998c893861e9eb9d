// SPDX-License-Identifier: MIT

//! Block device capability: geometry plus raw block access.

use bitflags::bitflags;

use crate::{BlockIO, BlockIOError, BlockIOResult};

bitflags! {
    /// Device flags reported alongside the geometry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u32 {
        const READONLY = 1 << 0;
        const REMOVABLE = 1 << 1;
    }
}

/// Geometry snapshot of a block device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub block_size: u32,
    pub block_count: u64,
    pub flags: BlockFlags,
}

impl BlockInfo {
    pub fn new(block_size: u32, block_count: u64) -> Self {
        Self {
            block_size,
            block_count,
            flags: BlockFlags::empty(),
        }
    }

    pub fn with_flags(mut self, flags: BlockFlags) -> Self {
        self.flags = flags;
        self
    }

    #[inline]
    pub fn size_bytes(&self) -> u64 {
        self.block_count.saturating_mul(self.block_size as u64)
    }

    #[inline]
    pub fn is_removable(&self) -> bool {
        self.flags.contains(BlockFlags::REMOVABLE)
    }

    /// Number of whole blocks needed to hold `bytes`.
    #[inline]
    pub fn blocks_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.block_size as u64)
    }
}

/// A block device: raw byte access plus geometry and a partition rescan hook.
pub trait BlockDevice: BlockIO {
    fn block_info(&self) -> BlockIOResult<BlockInfo>;

    /// Asks whatever sits on top of the device to re-read its partition table.
    fn rescan_partitions(&mut self) -> BlockIOResult;

    /// Reads whole blocks starting at `block`.
    fn read_blocks(&mut self, block: u64, buf: &mut [u8]) -> BlockIOResult {
        let offset = block_offset(self.block_info()?, block, buf.len())?;
        self.read_at(offset, buf)
    }

    /// Writes whole blocks starting at `block`.
    fn write_blocks(&mut self, block: u64, data: &[u8]) -> BlockIOResult {
        let info = self.block_info()?;
        if info.flags.contains(BlockFlags::READONLY) {
            return Err(BlockIOError::ReadOnly);
        }
        let offset = block_offset(info, block, data.len())?;
        self.write_at(offset, data)
    }
}

fn block_offset(info: BlockInfo, block: u64, len: usize) -> BlockIOResult<u64> {
    if len % info.block_size as usize != 0 {
        return Err(BlockIOError::Invalid("length is not a multiple of the block size"));
    }
    let blocks = (len / info.block_size as usize) as u64;
    let end = block.checked_add(blocks).ok_or(BlockIOError::OutOfBounds)?;
    if end > info.block_count {
        return Err(BlockIOError::OutOfBounds);
    }
    Ok(block * info.block_size as u64)
}

impl<T: BlockDevice + ?Sized> BlockDevice for Box<T> {
    fn block_info(&self) -> BlockIOResult<BlockInfo> {
        (**self).block_info()
    }

    fn rescan_partitions(&mut self) -> BlockIOResult {
        (**self).rescan_partitions()
    }
}

/// A `BlockIO` with fixed geometry and no partition driver behind it.
///
/// Rescans are accepted and do nothing.
#[derive(Debug)]
pub struct Disk<IO: BlockIO> {
    io: IO,
    info: BlockInfo,
}

impl<IO: BlockIO> Disk<IO> {
    pub fn new(io: IO, info: BlockInfo) -> Self {
        Self { io, info }
    }

    pub fn io(&self) -> &IO {
        &self.io
    }

    pub fn into_inner(self) -> IO {
        self.io
    }
}

impl<IO: BlockIO> BlockIO for Disk<IO> {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        if self.info.flags.contains(BlockFlags::READONLY) {
            return Err(BlockIOError::ReadOnly);
        }
        self.io.write_at(offset, data)
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        self.io.read_at(offset, buf)
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        self.io.flush()
    }
}

impl<IO: BlockIO> BlockDevice for Disk<IO> {
    fn block_info(&self) -> BlockIOResult<BlockInfo> {
        Ok(self.info)
    }

    fn rescan_partitions(&mut self) -> BlockIOResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn block_rw_respects_geometry() {
        let info = BlockInfo::new(512, 8);
        let mut disk = Disk::new(MemBlockIO::new(info.size_bytes()), info);

        disk.write_blocks(7, &[0x11; 512]).unwrap();
        let mut buf = [0u8; 512];
        disk.read_blocks(7, &mut buf).unwrap();
        assert_eq!(buf, [0x11; 512]);

        assert_eq!(disk.write_blocks(8, &[0; 512]), Err(BlockIOError::OutOfBounds));
        assert!(matches!(
            disk.read_blocks(0, &mut [0u8; 100]),
            Err(BlockIOError::Invalid(_))
        ));
    }

    #[test]
    fn readonly_disk_rejects_writes() {
        let info = BlockInfo::new(512, 4).with_flags(BlockFlags::READONLY);
        let mut disk = Disk::new(MemBlockIO::new(info.size_bytes()), info);
        assert_eq!(disk.write_at(0, &[1]), Err(BlockIOError::ReadOnly));
        assert!(disk.rescan_partitions().is_ok());
    }

    #[test]
    fn blocks_for_rounds_up() {
        let info = BlockInfo::new(512, 100);
        assert_eq!(info.blocks_for(0), 0);
        assert_eq!(info.blocks_for(1), 1);
        assert_eq!(info.blocks_for(1024), 2);
        assert_eq!(info.blocks_for(1025), 3);
        assert!(!info.is_removable());
    }
}
