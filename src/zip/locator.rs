//! Locating the end of central directory record.
//!
//! ZIP files are designed to be read from the end, but real files are not
//! always well formed: self-extracting stubs precede the archive, signing
//! tools append data after it, and comments may contain bytes that look
//! like an end record. The scan below walks backwards in small overlapping
//! windows and only accepts a signature that is corroborated either by a
//! comment length reaching exactly to end of file, or by the central
//! directory and first local header signatures it points at.

use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::structures::{
    CentralHeader, EndOfCentralDirectory, LocalHeader, Zip64EOCD, Zip64EOCDLocator,
};

/// Window size of the backward scan.
const READ_BLOCK: usize = 128;

/// The furthest back an end record can start: the fixed record plus the
/// largest possible comment.
const END_MAX_LEN: u64 = 0xFFFF + EndOfCentralDirectory::SIZE as u64;

/// Where the central directory lives, as declared by the end records.
#[derive(Debug, Clone)]
pub struct EndLocation {
    /// Offset of the legacy end record.
    pub end_pos: u64,
    /// Offset of the record the directory immediately precedes: the Zip64
    /// end record when one was used, otherwise `end_pos`.
    pub directory_end: u64,
    pub cen_size: u64,
    pub cen_offset: u64,
    pub total: u64,
    pub comment_len: u16,
    pub zip64: bool,
}

/// Find and validate the end record, resolving Zip64 when the legacy fields
/// are sentinels.
pub fn locate<R: ReadAt + ?Sized>(source: &R) -> Result<EndLocation> {
    let (end, end_pos) = find_end(source)?;

    let mut location = EndLocation {
        end_pos,
        directory_end: end_pos,
        cen_size: end.cd_size as u64,
        cen_offset: end.cd_offset as u64,
        total: end.total_entries as u64,
        comment_len: end.comment_len,
        zip64: false,
    };

    if end.is_zip64() {
        if let Some((end64, end64_pos)) = find_end64(source, end_pos)? {
            tracing::debug!(
                end64_pos,
                total = end64.total_entries,
                "using Zip64 end of central directory"
            );
            location.directory_end = end64_pos;
            location.cen_size = end64.cd_size;
            location.cen_offset = end64.cd_offset;
            location.total = end64.total_entries;
            location.zip64 = true;
        }
    }

    Ok(location)
}

/// Scan backwards for the legacy end record.
///
/// Returns the parsed record and its offset in the file.
pub fn find_end<R: ReadAt + ?Sized>(source: &R) -> Result<(EndOfCentralDirectory, u64)> {
    let len = source.size();
    let end_size = EndOfCentralDirectory::SIZE;
    if len < end_size as u64 {
        return Err(Error::format("zip file is empty or too short"));
    }

    let len = len as i64;
    let step = (READ_BLOCK - end_size) as i64;
    let min_header = (len - END_MAX_LEN as i64).max(0);
    let min_pos = min_header - step;

    let mut buf = [0u8; READ_BLOCK];
    let mut pos = len - READ_BLOCK as i64;
    while pos >= min_pos {
        // Bytes before the start of the file read as zeroes.
        let off = if pos < 0 { (-pos) as usize } else { 0 };
        buf[..off].fill(0);
        let want = (READ_BLOCK - off).min((len - (pos + off as i64)) as usize);
        source.read_exact_at((pos + off as i64) as u64, &mut buf[off..off + want])?;

        for i in (0..=READ_BLOCK - end_size).rev() {
            if &buf[i..i + 4] != EndOfCentralDirectory::SIGNATURE {
                continue;
            }
            let end_pos = pos + i as i64;
            if end_pos < min_header {
                continue;
            }
            let end = EndOfCentralDirectory::from_bytes(&buf[i..i + end_size])?;
            let record_end = end_pos + end_size as i64 + end.comment_len as i64;

            if record_end == len {
                return Ok((end, end_pos as u64));
            }

            if record_end < len && corroborated(source, &end, end_pos)? {
                tracing::warn!(
                    end_pos,
                    trailing = len - record_end,
                    "end record followed by trailing data"
                );
                return Ok((end, end_pos as u64));
            }
        }
        pos -= step;
    }

    Err(Error::format("zip END header not found"))
}

/// Cross-check a candidate end record: the central directory and the first
/// local header it implies must both carry their signatures.
fn corroborated<R: ReadAt + ?Sized>(
    source: &R,
    end: &EndOfCentralDirectory,
    end_pos: i64,
) -> Result<bool> {
    let cen_pos = end_pos - end.cd_size as i64;
    let loc_pos = cen_pos - end.cd_offset as i64;
    if cen_pos < 0 || loc_pos < 0 {
        return Ok(false);
    }

    let mut sig = [0u8; 4];
    source.read_exact_at(cen_pos as u64, &mut sig)?;
    if sig != CentralHeader::SIGNATURE {
        return Ok(false);
    }
    source.read_exact_at(loc_pos as u64, &mut sig)?;
    Ok(sig == LocalHeader::SIGNATURE)
}

/// Read the Zip64 locator immediately preceding the end record and the Zip64
/// end record it points to.
///
/// Returns `None` when either signature is missing; the legacy fields then
/// stay authoritative.
pub fn find_end64<R: ReadAt + ?Sized>(
    source: &R,
    end_pos: u64,
) -> Result<Option<(Zip64EOCD, u64)>> {
    let locator_size = Zip64EOCDLocator::SIZE as u64;
    if end_pos < locator_size {
        return Ok(None);
    }
    let locator_pos = end_pos - locator_size;
    let mut locator_buf = [0u8; Zip64EOCDLocator::SIZE];
    source.read_exact_at(locator_pos, &mut locator_buf)?;

    let Some(locator) = Zip64EOCDLocator::from_bytes(&locator_buf)? else {
        return Ok(None);
    };

    let record_size = Zip64EOCD::MIN_SIZE as u64;
    let mut record_buf = [0u8; Zip64EOCD::MIN_SIZE];

    let declared_fits = locator
        .eocd64_offset
        .checked_add(record_size)
        .is_some_and(|end| end <= locator_pos);
    if declared_fits {
        source.read_exact_at(locator.eocd64_offset, &mut record_buf)?;
        if let Some(record) = Zip64EOCD::from_bytes(&record_buf)? {
            return Ok(Some((record, locator.eocd64_offset)));
        }
    }

    // A prefix before the archive shifts every absolute offset; the record
    // normally sits right before the locator.
    if locator_pos >= record_size {
        let adjacent = locator_pos - record_size;
        source.read_exact_at(adjacent, &mut record_buf)?;
        if let Some(record) = Zip64EOCD::from_bytes(&record_buf)? {
            tracing::debug!(
                declared = locator.eocd64_offset,
                actual = adjacent,
                "Zip64 end record found adjacent to its locator"
            );
            return Ok(Some((record, adjacent)));
        }
    }

    Ok(None)
}
