//! Turning a central directory position into an [`Entry`].
//!
//! Header bytes come from a [`HeaderSource`]. Two implementations exist,
//! chosen by access pattern: [`RandomAccess`] reads each header on its own
//! with a generous first guess, [`Sequential`] keeps one page of the
//! directory buffered for enumeration. Both serve straight from the mapped
//! directory when the archive has one.

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use std::borrow::Cow;

use crate::error::{Error, Result, alloc_buffer};
use crate::io::ReadAt;

use super::entry::{DataOffset, Entry};
use super::index::HashCell;
use super::structures::{CentralHeader, CompressionMethod, ZIP64_EXTRA_ID, ZIP64_MAGIC};

/// Absolute extent of the central directory.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryRegion {
    pub pos: u64,
    pub len: u64,
}

impl DirectoryRegion {
    pub fn end(&self) -> u64 {
        self.pos + self.len
    }

    /// Bytes between `pos` and the end of the directory.
    fn available(&self, pos: u64) -> Result<usize> {
        if pos < self.pos || pos >= self.end() {
            return Err(Error::format("invalid CEN header (position outside directory)"));
        }
        Ok((self.end() - pos).min(usize::MAX as u64) as usize)
    }
}

/// Memory-mapped view of the central directory.
pub struct MappedDirectory {
    map: Mmap,
    pos: u64,
}

impl MappedDirectory {
    pub fn new(map: Mmap, pos: u64) -> Self {
        Self { map, pos }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.map
    }

    fn slice(&self, pos: u64, len: usize) -> Option<&[u8]> {
        let start = pos.checked_sub(self.pos)? as usize;
        self.map.get(start..start.checked_add(len)?)
    }
}

/// One buffered page of raw directory bytes.
#[derive(Debug, Default)]
pub struct PageCache {
    pos: u64,
    data: Vec<u8>,
}

impl PageCache {
    fn covers(&self, pos: u64, len: usize) -> bool {
        !self.data.is_empty()
            && pos >= self.pos
            && pos + len as u64 <= self.pos + self.data.len() as u64
    }

    fn slice(&self, pos: u64, len: usize) -> &[u8] {
        let start = (pos - self.pos) as usize;
        &self.data[start..start + len]
    }
}

/// Supplies raw header bytes.
pub trait HeaderSource {
    /// Bytes starting at `pos`: `len` of them, or fewer if the directory
    /// ends first.
    fn fetch(&mut self, pos: u64, len: usize) -> Result<Cow<'_, [u8]>>;
}

/// Reads each header independently.
pub struct RandomAccess<'a> {
    source: &'a dyn ReadAt,
    region: DirectoryRegion,
    mapped: Option<&'a MappedDirectory>,
}

impl<'a> RandomAccess<'a> {
    pub fn new(
        source: &'a dyn ReadAt,
        region: DirectoryRegion,
        mapped: Option<&'a MappedDirectory>,
    ) -> Self {
        Self {
            source,
            region,
            mapped,
        }
    }
}

impl HeaderSource for RandomAccess<'_> {
    fn fetch(&mut self, pos: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let len = len.min(self.region.available(pos)?);
        if let Some(bytes) = self.mapped.and_then(|m| m.slice(pos, len)) {
            return Ok(Cow::Borrowed(bytes));
        }
        let mut buf = alloc_buffer(len, "central directory header")?;
        self.source.read_exact_at(pos, &mut buf)?;
        Ok(Cow::Owned(buf))
    }
}

/// Serves headers from a page cache refilled on demand.
pub struct Sequential<'a> {
    source: &'a dyn ReadAt,
    region: DirectoryRegion,
    mapped: Option<&'a MappedDirectory>,
    page: &'a mut PageCache,
    page_size: usize,
}

impl<'a> Sequential<'a> {
    pub fn new(
        source: &'a dyn ReadAt,
        region: DirectoryRegion,
        mapped: Option<&'a MappedDirectory>,
        page: &'a mut PageCache,
        page_size: usize,
    ) -> Self {
        Self {
            source,
            region,
            mapped,
            page,
            page_size,
        }
    }
}

impl HeaderSource for Sequential<'_> {
    fn fetch(&mut self, pos: u64, len: usize) -> Result<Cow<'_, [u8]>> {
        let available = self.region.available(pos)?;
        let len = len.min(available);
        if let Some(bytes) = self.mapped.and_then(|m| m.slice(pos, len)) {
            return Ok(Cow::Borrowed(bytes));
        }
        if !self.page.covers(pos, len) {
            let fill = self.page_size.max(len).min(available);
            let mut data = alloc_buffer(fill, "central directory page")?;
            self.source.read_exact_at(pos, &mut data)?;
            self.page.pos = pos;
            self.page.data = data;
        } else {
            tracing::trace!(pos, "header served from page cache");
        }
        Ok(Cow::Borrowed(self.page.slice(pos, len)))
    }
}

/// Read the header `cell` points at and build an [`Entry`] from it.
///
/// The first fetch asks for `guess` bytes; if the header with its name,
/// extra field and comment is longer, it is fetched again in full.
pub fn materialize<S: HeaderSource + ?Sized>(
    source: &mut S,
    cell: &HashCell,
    index: usize,
    first_local_header: u64,
    guess: usize,
) -> Result<Entry> {
    let pos = cell.header_pos;
    let total = {
        let bytes = source.fetch(pos, guess.max(CentralHeader::SIZE))?;
        let header = CentralHeader::new(&bytes)?;
        if !header.has_signature() {
            return Err(Error::format("invalid CEN header (bad signature)"));
        }
        let total = header.total_len();
        if bytes.len() >= total {
            return parse_entry(&bytes[..total], cell.hash, index, first_local_header);
        }
        total
    };

    let bytes = source.fetch(pos, total)?;
    if bytes.len() < total {
        return Err(Error::format("invalid CEN header (bad header size)"));
    }
    parse_entry(&bytes[..total], cell.hash, index, first_local_header)
}

/// Build an entry from one complete central header.
pub fn parse_entry(raw: &[u8], hash: u32, index: usize, first_local_header: u64) -> Result<Entry> {
    let header = CentralHeader::new(raw)?;
    let name_end = CentralHeader::SIZE + header.name_len();
    let extra_end = name_end + header.extra_len();
    let comment_end = extra_end + header.comment_len();
    if raw.len() < comment_end {
        return Err(Error::format("invalid CEN header (bad header size)"));
    }

    let name = raw[CentralHeader::SIZE..name_end].to_vec();
    let extra = &raw[name_end..extra_end];
    let comment = &raw[extra_end..comment_end];

    let mut sizes = Zip64Fields {
        size: header.uncompressed_size() as u64,
        csize: header.compressed_size() as u64,
        offset: header.local_header_offset() as u64,
    };
    sizes.apply_extra(extra)?;

    let csize = match CompressionMethod::from_u16(header.method()) {
        CompressionMethod::Stored => 0,
        _ => sizes.csize,
    };

    Ok(Entry {
        name,
        hash,
        index,
        mod_time: header.mod_time(),
        size: sizes.size,
        csize,
        crc32: header.crc32(),
        flags: header.flags(),
        extra: (!extra.is_empty()).then(|| extra.to_vec()),
        comment: (!comment.is_empty()).then(|| comment.to_vec()),
        data_offset: DataOffset::Unresolved(first_local_header.saturating_add(sizes.offset)),
        owner: 0,
    })
}

/// The three header fields that a Zip64 extra block may override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Zip64Fields {
    size: u64,
    csize: u64,
    offset: u64,
}

impl Zip64Fields {
    fn needs_override(&self) -> bool {
        let magic = ZIP64_MAGIC as u64;
        self.size == magic || self.csize == magic || self.offset == magic
    }

    /// Replace exactly the sentinel fields, in their fixed order, from the
    /// Zip64 block of `extra`.
    fn apply_extra(&mut self, extra: &[u8]) -> Result<()> {
        if !self.needs_override() {
            return Ok(());
        }

        let mut off = 0;
        while off + 4 <= extra.len() {
            let mut head = &extra[off..off + 4];
            let id = head.read_u16::<LittleEndian>()?;
            let len = head.read_u16::<LittleEndian>()? as usize;
            let data_end = off + 4 + len;

            if id == ZIP64_EXTRA_ID {
                if data_end > extra.len() {
                    return Err(Error::format("invalid CEN header (bad zip64 extra field length)"));
                }
                let mut data = &extra[off + 4..data_end];
                let magic = ZIP64_MAGIC as u64;
                for field in [&mut self.size, &mut self.csize, &mut self.offset] {
                    if *field != magic {
                        continue;
                    }
                    if data.len() < 8 {
                        return Err(Error::format("invalid CEN header (truncated zip64 extra field)"));
                    }
                    *field = data.read_u64::<LittleEndian>()?;
                }
                return Ok(());
            }

            if data_end > extra.len() {
                // Malformed block of some other kind; nothing more to scan.
                break;
            }
            off = data_end;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::index::Link;

    fn zip64_block(values: &[u64]) -> Vec<u8> {
        let mut extra = Vec::new();
        extra.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
        extra.extend_from_slice(&((values.len() * 8) as u16).to_le_bytes());
        for v in values {
            extra.extend_from_slice(&v.to_le_bytes());
        }
        extra
    }

    fn header(name: &[u8], extra: &[u8], size: u32, csize: u32, offset: u32, method: u16) -> Vec<u8> {
        let mut raw = vec![0u8; CentralHeader::SIZE];
        raw[0..4].copy_from_slice(CentralHeader::SIGNATURE);
        raw[10..12].copy_from_slice(&method.to_le_bytes());
        raw[16..20].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        raw[20..24].copy_from_slice(&csize.to_le_bytes());
        raw[24..28].copy_from_slice(&size.to_le_bytes());
        raw[28..30].copy_from_slice(&(name.len() as u16).to_le_bytes());
        raw[30..32].copy_from_slice(&(extra.len() as u16).to_le_bytes());
        raw[42..46].copy_from_slice(&offset.to_le_bytes());
        raw.extend_from_slice(name);
        raw.extend_from_slice(extra);
        raw
    }

    #[test]
    fn plain_header() {
        let raw = header(b"dir/file.txt", b"", 10, 4, 77, 8);
        let entry = parse_entry(&raw, 1, 2, 100).unwrap();
        assert_eq!(entry.name(), b"dir/file.txt");
        assert_eq!(entry.size(), 10);
        assert_eq!(entry.compressed_size(), 4);
        assert_eq!(entry.crc32(), 0xDEADBEEF);
        assert_eq!(entry.data_offset(), DataOffset::Unresolved(177));
        assert!(entry.extra().is_none());
    }

    #[test]
    fn stored_entries_report_zero_csize() {
        let raw = header(b"a", b"", 10, 10, 0, 0);
        assert_eq!(parse_entry(&raw, 0, 0, 0).unwrap().compressed_size(), 0);
    }

    #[test]
    fn only_sentinel_fields_are_overridden() {
        // Only the compressed size and offset are sentinels: the block holds
        // exactly two values in that order.
        let mut extra = vec![0x99, 0x99, 2, 0, 0xAB, 0xCD];
        extra.extend_from_slice(&zip64_block(&[5_000_000_000, 6_000_000_000]));
        let raw = header(b"big", &extra, 123, ZIP64_MAGIC, ZIP64_MAGIC, 8);
        let entry = parse_entry(&raw, 0, 0, 0).unwrap();
        assert_eq!(entry.size(), 123);
        assert_eq!(entry.compressed_size(), 5_000_000_000);
        assert_eq!(entry.data_offset(), DataOffset::Unresolved(6_000_000_000));
    }

    #[test]
    fn stored_sentinels_still_consume_their_slot() {
        let extra = zip64_block(&[7, 7, 900]);
        let raw = header(b"s", &extra, ZIP64_MAGIC, ZIP64_MAGIC, ZIP64_MAGIC, 0);
        let entry = parse_entry(&raw, 0, 0, 0).unwrap();
        assert_eq!(entry.size(), 7);
        assert_eq!(entry.compressed_size(), 0);
        assert_eq!(entry.data_offset(), DataOffset::Unresolved(900));
    }

    #[test]
    fn truncated_zip64_block_is_a_format_error() {
        let extra = zip64_block(&[1]);
        let raw = header(b"x", &extra, ZIP64_MAGIC, ZIP64_MAGIC, 0, 8);
        assert!(matches!(parse_entry(&raw, 0, 0, 0), Err(Error::Format(_))));
    }

    #[test]
    fn overlong_zip64_block_is_a_format_error() {
        let mut extra = zip64_block(&[1]);
        extra[2] = 64;
        let raw = header(b"x", &extra, ZIP64_MAGIC, 0, 0, 8);
        assert!(matches!(parse_entry(&raw, 0, 0, 0), Err(Error::Format(_))));
    }

    #[test]
    fn missing_zip64_block_keeps_legacy_values() {
        let raw = header(b"x", &[0, 0, 0, 0], ZIP64_MAGIC, 3, 0, 8);
        let entry = parse_entry(&raw, 0, 0, 0).unwrap();
        assert_eq!(entry.size(), ZIP64_MAGIC as u64);
    }

    struct Bytes(Vec<u8>);

    impl HeaderSource for Bytes {
        fn fetch(&mut self, pos: u64, len: usize) -> Result<Cow<'_, [u8]>> {
            let start = pos as usize;
            let end = (start + len).min(self.0.len());
            Ok(Cow::Borrowed(&self.0[start..end]))
        }
    }

    #[test]
    fn grows_past_a_short_guess() {
        let name = vec![b'n'; 300];
        let raw = header(&name, b"", 1, 1, 0, 8);
        let mut source = Bytes(raw);
        let cell = HashCell {
            hash: 9,
            next: Link::END,
            header_pos: 0,
        };
        let entry = materialize(&mut source, &cell, 4, 0, 64).unwrap();
        assert_eq!(entry.name().len(), 300);
        assert_eq!(entry.index(), 4);
    }

    #[test]
    fn page_cache_refills_outside_its_window() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let region = DirectoryRegion { pos: 0, len: 1000 };
        let mut page = PageCache::default();
        let mut seq = Sequential::new(&data, region, None, &mut page, 100);

        assert_eq!(&seq.fetch(10, 4).unwrap()[..], &[10, 11, 12, 13]);
        assert_eq!(&seq.fetch(50, 4).unwrap()[..], &[50, 51, 52, 53]);
        assert_eq!(&seq.fetch(990, 50).unwrap()[..], &data[990..1000]);
        assert_eq!(page.pos, 990);
        assert!(seq_fetch_outside(&data, region).is_err());
    }

    fn seq_fetch_outside(data: &Vec<u8>, region: DirectoryRegion) -> Result<usize> {
        let mut page = PageCache::default();
        let mut seq = Sequential::new(data, region, None, &mut page, 100);
        seq.fetch(1000, 1).map(|b| b.len())
    }
}
