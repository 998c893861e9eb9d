// SPDX-License-Identifier: MIT

/// Simple I/O counters.
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct IoStats {
    pub reads: u64,
    pub read_bytes: u64,
    pub writes: u64,
    pub write_bytes: u64,
    pub flushes: u64,

    /// Offset of the most recent write, handy when asserting what got touched.
    pub last_write_offset: Option<u64>,
}

impl IoStats {
    #[inline]
    pub fn reset(&mut self) {
        *self = IoStats::default();
    }

    #[inline]
    pub fn record_read(&mut self, _offset: u64, len: usize) {
        self.reads += 1;
        self.read_bytes += len as u64;
    }

    #[inline]
    pub fn record_write(&mut self, offset: u64, len: usize) {
        self.writes += 1;
        self.write_bytes += len as u64;
        self.last_write_offset = Some(offset);
    }
}
