// SPDX-License-Identifier: MIT

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::stats::IoStats;
use crate::{BlockIO, BlockIOError, BlockIOResult};

/// Granularity of the sparse backing store.
const CHUNK_SIZE: u64 = 64 * 1024;

#[derive(Debug, Default)]
struct SparseStore {
    len: u64,
    chunks: BTreeMap<u64, Box<[u8]>>,
    stats: IoStats,
}

impl SparseStore {
    fn read(&self, offset: u64, buf: &mut [u8]) {
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let index = pos / CHUNK_SIZE;
            let within = (pos % CHUNK_SIZE) as usize;
            let take = (buf.len() - done).min(CHUNK_SIZE as usize - within);
            let dst = &mut buf[done..done + take];
            match self.chunks.get(&index) {
                Some(chunk) => dst.copy_from_slice(&chunk[within..within + take]),
                None => dst.fill(0),
            }
            done += take;
        }
    }

    fn write(&mut self, offset: u64, data: &[u8]) {
        let mut done = 0usize;
        while done < data.len() {
            let pos = offset + done as u64;
            let index = pos / CHUNK_SIZE;
            let within = (pos % CHUNK_SIZE) as usize;
            let take = (data.len() - done).min(CHUNK_SIZE as usize - within);
            let src = &data[done..done + take];
            // Zeroes over a hole stay a hole.
            if src.iter().any(|&b| b != 0) || self.chunks.contains_key(&index) {
                let chunk = self
                    .chunks
                    .entry(index)
                    .or_insert_with(|| vec![0u8; CHUNK_SIZE as usize].into_boxed_slice());
                chunk[within..within + take].copy_from_slice(src);
            }
            done += take;
        }
    }
}

/// In-memory, sparse implementation of `BlockIO`.
///
/// Clones share the same backing store, so a disk and the partition
/// windows carved out of it observe each other's writes. Unwritten
/// regions read back as zeroes and cost no memory, which keeps
/// multi-gigabyte test disks cheap.
#[derive(Debug, Clone)]
pub struct MemBlockIO {
    store: Rc<RefCell<SparseStore>>,
    partition_offset: u64,
    window_len: Option<u64>,
}

impl MemBlockIO {
    /// Creates a zero-filled device of `len` bytes.
    pub fn new(len: u64) -> Self {
        Self {
            store: Rc::new(RefCell::new(SparseStore {
                len,
                ..SparseStore::default()
            })),
            partition_offset: 0,
            window_len: None,
        }
    }

    /// Creates a device initialised with `data`.
    pub fn from_bytes(data: &[u8]) -> Self {
        let io = Self::new(data.len() as u64);
        io.store.borrow_mut().write(0, data);
        io
    }

    /// Returns a view of `len` bytes starting at `offset`, sharing this store.
    pub fn window(&self, offset: u64, len: u64) -> BlockIOResult<Self> {
        let abs = self
            .partition_offset
            .checked_add(offset)
            .ok_or(BlockIOError::OutOfBounds)?;
        let end = abs.checked_add(len).ok_or(BlockIOError::OutOfBounds)?;
        if end > self.partition_offset + self.len() {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(Self {
            store: Rc::clone(&self.store),
            partition_offset: abs,
            window_len: Some(len),
        })
    }

    /// Visible length in bytes (the window length for windows).
    pub fn len(&self) -> u64 {
        match self.window_len {
            Some(len) => len,
            None => self.store.borrow().len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn partition_offset(&self) -> u64 {
        self.partition_offset
    }

    /// Counters shared by every view of the store.
    pub fn stats(&self) -> IoStats {
        self.store.borrow().stats
    }

    /// Returns true if both handles point at the same backing store.
    pub fn same_store(&self, other: &MemBlockIO) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    #[inline]
    fn check_bounds(&self, offset: u64, len: usize) -> BlockIOResult<u64> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if end > self.len() {
            return Err(BlockIOError::OutOfBounds);
        }
        Ok(self.partition_offset + offset)
    }
}

impl BlockIO for MemBlockIO {
    #[inline]
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        let abs = self.check_bounds(offset, data.len())?;
        let mut store = self.store.borrow_mut();
        store.stats.record_write(abs, data.len());
        store.write(abs, data);
        Ok(())
    }

    #[inline]
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let abs = self.check_bounds(offset, buf.len())?;
        let mut store = self.store.borrow_mut();
        store.stats.record_read(abs, buf.len());
        store.read(abs, buf);
        Ok(())
    }

    #[inline]
    fn flush(&mut self) -> BlockIOResult {
        self.store.borrow_mut().stats.flushes += 1;
        Ok(())
    }
}
