//! Composable writers that translate a flat byte stream into writes at
//! specific block ranges ("extents") of a partition file.
//!
//! Writers are composed by wrapping, not by inheritance: a
//! [`DirectExtentWriter`] is typically wrapped in a [`ZeroPadExtentWriter`]
//! and, for compressed operations, a [`BzipExtentWriter`] on top of that.

use std::io;
use std::os::unix::fs::FileExt;

use bzip2::read::BzDecoder;
use std::io::Read;

use crate::proto::Extent;

#[derive(Debug)]
pub enum Error {
    Write(io::Error),
    Decompress(io::Error),
    ExtentsExhausted,
    SparseHoleAsDestination,
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Write(err) => write!(f, "failed to write extent data: {err}"),
            Error::Decompress(err) => write!(f, "failed to decompress operation data: {err}"),
            Error::ExtentsExhausted => write!(f, "wrote more bytes than the destination extents can hold"),
            Error::SparseHoleAsDestination => write!(f, "sparse hole used as a destination extent"),
        }
    }
}

pub(super) type Result<T> = std::result::Result<T, Error>;

/// Sentinel `start_block` value meaning "this is a logical hole, skip it".
pub const SPARSE_HOLE: u64 = u64::MAX;

pub trait ExtentWriter {
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Called once after the last `write`. Implementations that buffer a
    /// partial trailing block use this to flush/pad it.
    fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes bytes into successive extents of a partition file via `pwrite`,
/// advancing through the extent list as each one fills up.
pub struct DirectExtentWriter<'a> {
    file: &'a std::fs::File,
    block_size: u64,
    extents: &'a [Extent],
    extent_index: usize,
    offset_in_extent: u64,
}

impl<'a> DirectExtentWriter<'a> {
    pub fn new(file: &'a std::fs::File, block_size: u64, extents: &'a [Extent]) -> Result<Self> {
        for extent in extents {
            if extent.start_block() == SPARSE_HOLE {
                return Err(Error::SparseHoleAsDestination);
            }
        }
        Ok(DirectExtentWriter {
            file,
            block_size,
            extents,
            extent_index: 0,
            offset_in_extent: 0,
        })
    }

    fn current_file_offset(&self) -> Option<u64> {
        let extent = self.extents.get(self.extent_index)?;
        Some(extent.start_block() * self.block_size + self.offset_in_extent)
    }

    fn current_extent_remaining(&self) -> Option<u64> {
        let extent = self.extents.get(self.extent_index)?;
        Some(extent.num_blocks() * self.block_size - self.offset_in_extent)
    }
}

impl<'a> ExtentWriter for DirectExtentWriter<'a> {
    fn write(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let remaining = self.current_extent_remaining().ok_or(Error::ExtentsExhausted)?;
            let file_offset = self.current_file_offset().ok_or(Error::ExtentsExhausted)?;
            let take = remaining.min(data.len() as u64) as usize;

            self.file.write_all_at(&data[..take], file_offset).map_err(Error::Write)?;

            self.offset_in_extent += take as u64;
            if self.offset_in_extent >= remaining {
                self.extent_index += 1;
                self.offset_in_extent = 0;
            }
            data = &data[take..];
        }
        Ok(())
    }
}

/// Wraps another writer and, on `end`, pads the current position up to a
/// whole block boundary with zero bytes, so a trailing partial block is
/// always fully written.
pub struct ZeroPadExtentWriter<W> {
    inner: W,
    block_size: u64,
    written_since_block: u64,
}

impl<W: ExtentWriter> ZeroPadExtentWriter<W> {
    pub fn new(inner: W, block_size: u64) -> Self {
        ZeroPadExtentWriter { inner, block_size, written_since_block: 0 }
    }
}

impl<W: ExtentWriter> ExtentWriter for ZeroPadExtentWriter<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write(data)?;
        self.written_since_block = (self.written_since_block + data.len() as u64) % self.block_size;
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        if self.written_since_block != 0 {
            let pad_len = (self.block_size - self.written_since_block) as usize;
            self.inner.write(&vec![0u8; pad_len])?;
            self.written_since_block = 0;
        }
        self.inner.end()
    }
}

/// Wraps another writer, streaming input through a bzip2 decompressor
/// before handing bytes downstream.
pub struct BzipExtentWriter<W> {
    inner: W,
    compressed: Vec<u8>,
}

impl<W: ExtentWriter> BzipExtentWriter<W> {
    pub fn new(inner: W) -> Self {
        BzipExtentWriter { inner, compressed: Vec::new() }
    }
}

impl<W: ExtentWriter> ExtentWriter for BzipExtentWriter<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        // bzip2 frames cannot be decompressed incrementally here without
        // retaining decoder state across partial blocks, so operation
        // data is buffered in full and decompressed on `end`. Payload
        // operations are bounded by `dst_extents` byte length, so this
        // never grows past one operation's data blob.
        self.compressed.extend_from_slice(data);
        Ok(())
    }

    fn end(&mut self) -> Result<()> {
        let mut decoder = BzDecoder::new(&self.compressed[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).map_err(Error::Decompress)?;
        self.inner.write(&decompressed)?;
        self.inner.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::Extent;
    use std::fs::File;
    use std::os::unix::fs::FileExt;

    fn extent(start_block: u64, num_blocks: u64) -> Extent {
        let mut e = Extent::new();
        e.set_start_block(start_block);
        e.set_num_blocks(num_blocks);
        e
    }

    #[test]
    fn direct_writer_spans_multiple_extents() {
        let file = tempfile::tempfile().unwrap();
        let extents = vec![extent(0, 1), extent(2, 1)];
        let mut writer = DirectExtentWriter::new(&file, 4, &extents).unwrap();

        writer.write(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        let mut buf = [0u8; 4];
        file.read_exact_at(&mut buf, 0).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        file.read_exact_at(&mut buf, 8).unwrap();
        assert_eq!(buf, [5, 6, 7, 8]);
    }

    #[test]
    fn zero_pad_fills_trailing_block() {
        let file = tempfile::tempfile().unwrap();
        let extents = vec![extent(0, 1)];
        let direct = DirectExtentWriter::new(&file, 4, &extents).unwrap();
        let mut writer = ZeroPadExtentWriter::new(direct, 4);

        writer.write(&[9, 9]).unwrap();
        writer.end().unwrap();

        let mut buf = [0u8; 4];
        file.read_exact_at(&mut buf, 0).unwrap();
        assert_eq!(buf, [9, 9, 0, 0]);
    }

    #[test]
    fn sparse_hole_destination_rejected() {
        let file = tempfile::tempfile().unwrap();
        let extents = vec![extent(SPARSE_HOLE, 1)];
        assert!(DirectExtentWriter::new(&file, 4, &extents).is_err());
    }
}
