//! Parsing the central directory into an [`EntryIndex`].
//!
//! The whole directory is read (or mapped) once and walked header by header.
//! Only the name hash and header position of each member are kept; the raw
//! buffer is dropped afterwards unless it is a mapping, and headers are
//! re-read on demand by the materializer.

use crate::config::ArchiveOptions;
use crate::error::{Error, Result, alloc_buffer};
use crate::io::ReadAt;

use super::index::{EntryIndex, hash_name};
use super::locator::{EndLocation, locate};
use super::materialize::{DirectoryRegion, MappedDirectory};
use super::structures::{CentralHeader, EndOfCentralDirectory};

/// Reserved prefix of metadata members, compared case-insensitively.
pub const META_PREFIX: &[u8] = b"META-INF/";

/// Everything learned from the end record and the directory walk.
pub struct CentralDirectory {
    pub index: EntryIndex,
    pub region: DirectoryRegion,
    /// Offset of byte 0 of the archive proper; nonzero when a stub precedes
    /// the ZIP data.
    pub first_local_header: u64,
    pub comment: Option<Vec<u8>>,
    pub meta_names: Vec<Vec<u8>>,
    pub mapped: Option<MappedDirectory>,
    pub zip64: bool,
}

/// Locate and parse the central directory of `source`.
///
/// Either the whole directory is indexed or an error is returned; nothing
/// partially built escapes.
pub fn read_central_directory(
    source: &dyn ReadAt,
    options: &ArchiveOptions,
) -> Result<CentralDirectory> {
    let location = locate(source)?;
    let region = directory_region(&location)?;
    let first_local_header = region.pos - location.cen_offset;

    tracing::debug!(
        cen_pos = region.pos,
        cen_len = region.len,
        total = location.total,
        first_local_header,
        zip64 = location.zip64,
        "central directory located"
    );

    let comment = read_comment(source, &location)?;

    let cen_len = usize::try_from(region.len)
        .map_err(|_| Error::format("invalid END header (central directory too large)"))?;

    let mapped = if options.map_directory {
        match source.map(region.pos, cen_len) {
            Ok(map) => map.map(|m| MappedDirectory::new(m, region.pos)),
            Err(e) => {
                tracing::debug!("mapping central directory failed, reading instead: {}", e);
                None
            }
        }
    } else {
        None
    };

    let read_buf;
    let cen: &[u8] = match &mapped {
        Some(m) => m.bytes(),
        None => {
            let mut buf = alloc_buffer(cen_len, "central directory")?;
            source.read_exact_at(region.pos, &mut buf)?;
            read_buf = buf;
            &read_buf
        }
    };

    let (index, meta_names) = build_index(cen, region.pos, location.total, options)?;

    Ok(CentralDirectory {
        index,
        region,
        first_local_header,
        comment,
        meta_names,
        mapped,
        zip64: location.zip64,
    })
}

fn directory_region(location: &EndLocation) -> Result<DirectoryRegion> {
    if location.cen_size > location.directory_end {
        return Err(Error::format("invalid END header (bad central directory size)"));
    }
    let pos = location.directory_end - location.cen_size;
    if location.cen_offset > pos {
        return Err(Error::format("invalid END header (bad central directory offset)"));
    }
    Ok(DirectoryRegion {
        pos,
        len: location.cen_size,
    })
}

fn read_comment(source: &dyn ReadAt, location: &EndLocation) -> Result<Option<Vec<u8>>> {
    let start = location.end_pos + EndOfCentralDirectory::SIZE as u64;
    let len = (location.comment_len as u64).min(source.size().saturating_sub(start)) as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut comment = vec![0u8; len];
    source.read_exact_at(start, &mut comment)?;
    Ok(Some(comment))
}

/// Walk the raw directory `cen`, which starts at absolute offset `cen_pos`,
/// expecting `total` headers.
///
/// When more headers are present than declared (the 16-bit count of an
/// archive with more than 65535 members written without Zip64) the real
/// headers are counted and the walk restarts with that count, unless the
/// options forbid it.
pub fn build_index(
    cen: &[u8],
    cen_pos: u64,
    total: u64,
    options: &ArchiveOptions,
) -> Result<(EntryIndex, Vec<Vec<u8>>)> {
    let mut index = EntryIndex::with_capacity(total)?;
    let mut meta_names = Vec::new();

    let mut off = 0usize;
    while off + CentralHeader::SIZE <= cen.len() {
        if index.len() as u64 == total {
            if !options.recount_overflow {
                return Err(Error::format("invalid END header (bad entry count)"));
            }
            let real = count_headers(cen);
            tracing::warn!(declared = total, real, "entry count overflow, re-reading directory");
            return build_index(cen, cen_pos, real, &options.recount_overflow(false));
        }

        let header = CentralHeader::new(&cen[off..])?;
        header.validate()?;

        let name_start = off + CentralHeader::SIZE;
        let name_end = name_start + header.name_len();
        if name_end > cen.len() {
            return Err(Error::format("invalid CEN header (bad header size)"));
        }
        let name = &cen[name_start..name_end];

        index.push(hash_name(name), cen_pos + off as u64);
        if is_meta_name(name) {
            meta_names.push(name.to_vec());
        }

        off += header.total_len();
    }

    if (index.len() as u64) != total {
        return Err(Error::format("invalid CEN header (bad entry count)"));
    }

    Ok((index, meta_names))
}

/// Number of headers actually present, following each header's declared
/// length without validating it.
pub fn count_headers(cen: &[u8]) -> u64 {
    let mut count = 0;
    let mut off = 0usize;
    while off + CentralHeader::SIZE <= cen.len() {
        match CentralHeader::new(&cen[off..]) {
            Ok(header) => off += header.total_len(),
            Err(_) => break,
        }
        count += 1;
    }
    count
}

/// True for names under the metadata prefix, excluding the bare prefix.
pub fn is_meta_name(name: &[u8]) -> bool {
    name.len() > META_PREFIX.len() && name[..META_PREFIX.len()].eq_ignore_ascii_case(META_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::index::hash_name;

    fn cen_header(name: &[u8], method: u16, flags: u16) -> Vec<u8> {
        let mut raw = vec![0u8; CentralHeader::SIZE];
        raw[0..4].copy_from_slice(CentralHeader::SIGNATURE);
        raw[8..10].copy_from_slice(&flags.to_le_bytes());
        raw[10..12].copy_from_slice(&method.to_le_bytes());
        raw[28..30].copy_from_slice(&(name.len() as u16).to_le_bytes());
        raw.extend_from_slice(name);
        raw
    }

    fn directory(names: &[&[u8]]) -> Vec<u8> {
        names.iter().flat_map(|n| cen_header(n, 8, 0)).collect()
    }

    #[test]
    fn indexes_every_header() {
        let cen = directory(&[b"a", b"META-INF/MANIFEST.MF", b"dir/", b"meta-inf/x.sf"]);
        let (index, meta) = build_index(&cen, 1000, 4, &ArchiveOptions::default()).unwrap();
        assert_eq!(index.len(), 4);
        assert_eq!(index.cell(0).unwrap().header_pos, 1000);
        assert_eq!(index.cell(1).unwrap().header_pos, 1000 + 47);
        assert_eq!(index.cell(2).unwrap().hash, hash_name(b"dir/"));
        assert_eq!(meta, vec![b"META-INF/MANIFEST.MF".to_vec(), b"meta-inf/x.sf".to_vec()]);
    }

    #[test]
    fn overflowing_count_is_recounted() {
        let cen = directory(&[b"a", b"b", b"c"]);
        let (index, _) = build_index(&cen, 0, 1, &ArchiveOptions::default()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(count_headers(&cen), 3);
    }

    #[test]
    fn overflowing_count_is_rejected_in_strict_mode() {
        let cen = directory(&[b"a", b"b", b"c"]);
        let options = ArchiveOptions::default().recount_overflow(false);
        assert!(matches!(build_index(&cen, 0, 1, &options), Err(Error::Format(_))));
    }

    #[test]
    fn missing_headers_are_rejected() {
        let cen = directory(&[b"a"]);
        assert!(build_index(&cen, 0, 2, &ArchiveOptions::default()).is_err());
    }

    #[test]
    fn unsupported_headers_abort_the_walk() {
        let mut cen = directory(&[b"ok"]);
        cen.extend(cen_header(b"lzma", 14, 0));
        let err = build_index(&cen, 0, 2, &ArchiveOptions::default()).unwrap_err();
        assert!(err.to_string().contains("bad compression method"));

        let mut cen = directory(&[b"ok"]);
        cen.extend(cen_header(b"secret", 0, 1));
        let err = build_index(&cen, 0, 2, &ArchiveOptions::default()).unwrap_err();
        assert!(err.to_string().contains("encrypted"));

        let mut cen = cen_header(b"truncated-name", 0, 0);
        cen.truncate(CentralHeader::SIZE + 3);
        let err = build_index(&cen, 0, 1, &ArchiveOptions::default()).unwrap_err();
        assert!(err.to_string().contains("bad header size"));
    }

    #[test]
    fn meta_prefix_alone_is_not_a_meta_name() {
        assert!(!is_meta_name(b"META-INF/"));
        assert!(is_meta_name(b"Meta-Inf/a"));
        assert!(!is_meta_name(b"META-INF"));
    }
}
