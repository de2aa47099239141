//! Byte sources the central directory engine reads from.
//!
//! The engine only needs positioned reads and the total length. Sources that
//! sit on a real file may additionally hand out a memory-mapped region.

mod http;
mod local;

pub use http::HttpRangeReader;
pub use local::{LocalFileReader, fingerprint};

use memmap2::Mmap;
use std::io;

/// Trait for random access reading from a data source
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Map `len` bytes starting at `offset`, if this source supports it.
    fn map(&self, _offset: u64, _len: usize) -> io::Result<Option<Mmap>> {
        Ok(None)
    }

    /// Fill `buf` completely from `offset`, retrying interrupted reads.
    fn read_exact_at(&self, mut offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(offset, buf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("unexpected end of file at offset {}", offset),
                    ));
                }
                Ok(n) => {
                    offset += n as u64;
                    buf = &mut buf[n..];
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// In-memory source, handy for archives already held in a buffer.
impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.len() as u64;
        if offset >= len {
            return Ok(0);
        }
        let start = offset as usize;
        let n = buf.len().min(self.len() - start);
        buf[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}
