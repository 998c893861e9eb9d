// SPDX-License-Identifier: MIT

use std::io::{Read, Seek, SeekFrom, Write};

use crate::{BlockIO, BlockIOError, BlockIOResult};

/// `BlockIO` over anything seekable: image files, raw device nodes.
///
/// An optional window restricts the handle to `[offset, offset + len)`,
/// which is how partition nodes of an image are exposed.
#[derive(Debug)]
pub struct StdBlockIO<T: Read + Write + Seek> {
    io: T,
    partition_offset: u64,
    window_len: Option<u64>,
}

impl<T: Read + Write + Seek> StdBlockIO<T> {
    #[inline]
    pub fn new(io: T) -> Self {
        Self {
            io,
            partition_offset: 0,
            window_len: None,
        }
    }

    #[inline]
    pub fn new_with_window(io: T, partition_offset: u64, len: u64) -> Self {
        Self {
            io,
            partition_offset,
            window_len: Some(len),
        }
    }

    #[inline]
    pub fn partition_offset(&self) -> u64 {
        self.partition_offset
    }

    #[inline]
    pub fn window_len(&self) -> Option<u64> {
        self.window_len
    }

    pub fn into_inner(self) -> T {
        self.io
    }

    #[inline]
    fn absolute(&self, offset: u64, len: usize) -> BlockIOResult<u64> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(BlockIOError::OutOfBounds)?;
        if let Some(limit) = self.window_len
            && end > limit
        {
            return Err(BlockIOError::OutOfBounds);
        }
        self.partition_offset
            .checked_add(offset)
            .ok_or(BlockIOError::OutOfBounds)
    }
}

impl<T: Read + Write + Seek> BlockIO for StdBlockIO<T> {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult {
        let abs_offset = self.absolute(offset, data.len())?;
        self.io.seek(SeekFrom::Start(abs_offset))?;
        self.io.write_all(data)?;
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult {
        let abs_offset = self.absolute(offset, buf.len())?;
        self.io.seek(SeekFrom::Start(abs_offset))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> BlockIOResult {
        self.io.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::prelude::*;
    use tempfile::tempfile;

    #[test]
    fn test_rw() {
        let file = tempfile().unwrap();
        let mut io = StdBlockIO::new(file);
        io.write_at(10, &[1, 2, 3, 4]).unwrap();

        let mut output = [0u8; 4];
        io.read_at(10, &mut output).unwrap();
        assert_eq!(output, [1, 2, 3, 4]);
    }

    #[test]
    fn test_window_bounds() {
        let file = tempfile().unwrap();
        file.set_len(4096).unwrap();
        let mut io = StdBlockIO::new_with_window(file, 1024, 512);

        io.write_at(0, &[0xCD; 4]).unwrap();
        assert_eq!(io.write_at(510, &[0; 4]), Err(BlockIOError::OutOfBounds));

        let mut file = io.into_inner();
        let mut whole = StdBlockIO::new(&mut file);
        let mut buf = [0u8; 4];
        whole.read_at(1024, &mut buf).unwrap();
        assert_eq!(buf, [0xCD; 4]);
    }

    #[test]
    fn test_zero_fill() {
        let file = tempfile().unwrap();
        let mut io = StdBlockIO::new(file);

        io.write_at(42, &[0xFF; 8]).unwrap();
        io.zero_fill(42, 8).unwrap();

        let mut buf = [0xAA; 8];
        io.read_at(42, &mut buf).unwrap();

        assert_eq!(buf, [0u8; 8]);
    }
}
