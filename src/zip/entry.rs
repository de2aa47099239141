use std::borrow::Cow;

use super::structures::CompressionMethod;

/// Where a member's data starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOffset {
    /// Not yet looked up; holds the absolute offset of the local header.
    Unresolved(u64),
    /// Absolute offset of the first data byte.
    Resolved(u64),
}

/// A fully materialized archive member.
///
/// Entries are owned by whoever received them. Handing one back through
/// [`Archive::release_entry`](super::Archive::release_entry) lets the archive
/// reuse it for the next lookup of the same name.
#[derive(Debug, Clone)]
pub struct Entry {
    pub(crate) name: Vec<u8>,
    pub(crate) hash: u32,
    pub(crate) index: usize,
    pub(crate) mod_time: u32,
    pub(crate) size: u64,
    pub(crate) csize: u64,
    pub(crate) crc32: u32,
    pub(crate) flags: u16,
    pub(crate) extra: Option<Vec<u8>>,
    pub(crate) comment: Option<Vec<u8>>,
    pub(crate) data_offset: DataOffset,
    /// Id of the archive that handed this entry out, 0 if none.
    pub(crate) owner: u64,
}

impl Entry {
    /// Raw name bytes. Names may contain any byte, including NUL.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Name for display, with invalid UTF-8 replaced.
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Position of this member in central directory order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_directory(&self) -> bool {
        self.name.last() == Some(&b'/')
    }

    /// Uncompressed size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Compressed size, or 0 for stored members.
    pub fn compressed_size(&self) -> u64 {
        self.csize
    }

    pub fn compression_method(&self) -> CompressionMethod {
        if self.csize == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflate
        }
    }

    /// Number of raw bytes stored in the archive for this member.
    pub fn stored_len(&self) -> u64 {
        if self.csize != 0 { self.csize } else { self.size }
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn extra(&self) -> Option<&[u8]> {
        self.extra.as_deref()
    }

    pub fn comment(&self) -> Option<&[u8]> {
        self.comment.as_deref()
    }

    pub fn data_offset(&self) -> DataOffset {
        self.data_offset
    }

    /// Raw DOS date and time, date in the high 16 bits.
    pub fn dos_time(&self) -> u32 {
        self.mod_time
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let date = (self.mod_time >> 16) as u16;
        let day = (date & 0x1F) as u8;
        let month = ((date >> 5) & 0x0F) as u8;
        let year = ((date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_clock(&self) -> (u8, u8, u8) {
        let time = self.mod_time as u16;
        let second = ((time & 0x1F) * 2) as u8;
        let minute = ((time >> 5) & 0x3F) as u8;
        let hour = ((time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}
