//! Reading member data: data offset resolution, bounds-checked positioned
//! reads, and raw deflate decompression.

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{Error, Result, alloc_buffer};
use crate::io::ReadAt;

use super::entry::{DataOffset, Entry};
use super::structures::LocalHeader;

/// Offset of the first data byte of `entry`, memoized in the entry.
///
/// The local header is read rather than the central one because the two
/// may disagree on the extra field length.
pub fn resolve_data_offset(source: &dyn ReadAt, entry: &mut Entry) -> Result<u64> {
    match entry.data_offset {
        DataOffset::Resolved(pos) => Ok(pos),
        DataOffset::Unresolved(local_header) => {
            let mut buf = [0u8; LocalHeader::SIZE];
            source.read_exact_at(local_header, &mut buf)?;
            let pos = local_header + LocalHeader::SIZE as u64 + LocalHeader::variable_len(&buf)?;
            entry.data_offset = DataOffset::Resolved(pos);
            Ok(pos)
        }
    }
}

/// Check that all stored bytes of `entry` lie inside an archive of
/// `archive_len` bytes, resolving the data offset on the way.
pub fn check_extent(source: &dyn ReadAt, archive_len: u64, entry: &mut Entry) -> Result<()> {
    let start = resolve_data_offset(source, entry)?;
    match start.checked_add(entry.stored_len()) {
        Some(end) if end <= archive_len => Ok(()),
        _ => Err(Error::corruption("invalid entry size")),
    }
}

/// Read raw (possibly compressed) bytes of `entry` starting at `pos`.
///
/// `buf` is clipped to the bytes remaining in the member. An empty `buf`
/// returns 0 without touching the source.
pub fn read_raw(
    source: &dyn ReadAt,
    archive_len: u64,
    entry: &mut Entry,
    pos: u64,
    buf: &mut [u8],
) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let logical = entry.stored_len();
    if pos >= logical {
        return Err(Error::format("specified offset out of range"));
    }
    let len = (buf.len() as u64).min(logical - pos) as usize;

    let start = resolve_data_offset(source, entry)? + pos;
    match start.checked_add(len as u64) {
        Some(end) if end <= archive_len => {}
        _ => return Err(Error::corruption("invalid entry size")),
    }

    source.read_exact_at(start, &mut buf[..len])?;
    Ok(len)
}

/// Inflate a deflated member into a buffer of exactly its declared size.
///
/// Compressed bytes are pulled `chunk` at a time through `read`, which is
/// expected to take and release whatever lock guards the source on every
/// call.
pub fn inflate<F>(entry: &mut Entry, chunk: usize, mut read: F) -> Result<Vec<u8>>
where
    F: FnMut(&mut Entry, u64, &mut [u8]) -> Result<usize>,
{
    let size = usize::try_from(entry.size)
        .map_err(|_| Error::OutOfMemory(format!("entry of {} bytes", entry.size)))?;
    let csize = entry.csize;

    // One spare byte of capacity makes an overlong stream visible.
    let mut out = Vec::new();
    out.try_reserve_exact(size.saturating_add(1))
        .map_err(|_| Error::OutOfMemory(format!("entry of {} bytes", size)))?;
    let mut input = alloc_buffer(chunk.max(1), "inflate buffer")?;
    let mut decoder = Decompress::new(false);
    let mut pos = 0u64;

    loop {
        if pos >= csize {
            return Err(Error::decompression("inflateFully: unexpected end of file"));
        }
        let n = read(entry, pos, &mut input)?;
        if n == 0 {
            return Err(Error::decompression("inflateFully: unexpected end of file"));
        }
        pos += n as u64;

        let mut consumed = 0;
        while consumed < n {
            let before_in = decoder.total_in();
            let before_out = decoder.total_out();
            let status = decoder
                .decompress_vec(&input[consumed..n], &mut out, FlushDecompress::None)
                .map_err(|e| Error::decompression(format!("invalid deflate data: {}", e)))?;
            consumed += (decoder.total_in() - before_in) as usize;

            if out.len() > size {
                return Err(Error::decompression(
                    "inflateFully: inflated data exceeds declared size",
                ));
            }

            match status {
                Status::StreamEnd => {
                    if out.len() != size {
                        return Err(Error::decompression("inflateFully: unexpected end of stream"));
                    }
                    return Ok(out);
                }
                Status::Ok | Status::BufError => {
                    if decoder.total_in() == before_in && decoder.total_out() == before_out {
                        return Err(Error::decompression("inflateFully: stream stalled"));
                    }
                }
            }
        }
    }
}
