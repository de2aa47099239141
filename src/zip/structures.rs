//! Fixed-layout records of the ZIP format.
//!
//! All multi-byte fields are little endian. Each record type parses only its
//! fixed prefix; variable-length trailers (names, extra fields, comments) are
//! sliced by the callers that need them.

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::{Error, Result};

/// 32-bit field value meaning "see the Zip64 record".
pub const ZIP64_MAGIC: u32 = 0xFFFF_FFFF;
/// 16-bit count value meaning "see the Zip64 record".
pub const ZIP64_MAGIC_COUNT: u16 = 0xFFFF;
/// Extra-field tag of the Zip64 extended information block.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// General purpose flag bit marking an encrypted entry.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::format("invalid END header (bad signature)"));
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);

        Ok(Self {
            disk_number: cursor.read_u16::<LittleEndian>()?,
            disk_with_cd: cursor.read_u16::<LittleEndian>()?,
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    /// True when any of size, offset or count defers to the Zip64 record.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == ZIP64_MAGIC_COUNT
            || self.cd_size == ZIP64_MAGIC
            || self.cd_offset == ZIP64_MAGIC
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    /// Returns `None` when the signature does not match: the legacy end
    /// record then stays authoritative.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&data[4..Self::SIZE]);

        Ok(Some(Self {
            disk_with_eocd64: cursor.read_u32::<LittleEndian>()?,
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
            total_disks: cursor.read_u32::<LittleEndian>()?,
        }))
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone)]
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    /// Returns `None` when the signature does not match.
    pub fn from_bytes(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            return Ok(None);
        }

        let mut cursor = Cursor::new(&data[4..Self::MIN_SIZE]);

        Ok(Some(Self {
            eocd64_size: cursor.read_u64::<LittleEndian>()?,
            version_made_by: cursor.read_u16::<LittleEndian>()?,
            version_needed: cursor.read_u16::<LittleEndian>()?,
            disk_number: cursor.read_u32::<LittleEndian>()?,
            disk_with_cd: cursor.read_u32::<LittleEndian>()?,
            disk_entries: cursor.read_u64::<LittleEndian>()?,
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        }))
    }
}

/// Fixed 46-byte prefix of a central directory file header.
///
/// Field offsets are read directly so the walk over a large directory does
/// not need to decode fields it ignores.
#[derive(Debug, Clone, Copy)]
pub struct CentralHeader<'a> {
    raw: &'a [u8],
}

impl<'a> CentralHeader<'a> {
    pub const SIGNATURE: &'static [u8] = b"PK\x01\x02";
    pub const SIZE: usize = 46;

    /// Wraps the fixed prefix at the start of `data`. Fails if fewer than
    /// 46 bytes are available; the signature is checked separately.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::format("invalid CEN header (bad header size)"));
        }
        Ok(Self {
            raw: &data[..Self::SIZE],
        })
    }

    pub fn has_signature(&self) -> bool {
        &self.raw[0..4] == Self::SIGNATURE
    }

    pub fn flags(&self) -> u16 {
        LittleEndian::read_u16(&self.raw[8..])
    }

    pub fn method(&self) -> u16 {
        LittleEndian::read_u16(&self.raw[10..])
    }

    /// DOS time in the low half, DOS date in the high half.
    pub fn mod_time(&self) -> u32 {
        LittleEndian::read_u32(&self.raw[12..])
    }

    pub fn crc32(&self) -> u32 {
        LittleEndian::read_u32(&self.raw[16..])
    }

    pub fn compressed_size(&self) -> u32 {
        LittleEndian::read_u32(&self.raw[20..])
    }

    pub fn uncompressed_size(&self) -> u32 {
        LittleEndian::read_u32(&self.raw[24..])
    }

    pub fn name_len(&self) -> usize {
        LittleEndian::read_u16(&self.raw[28..]) as usize
    }

    pub fn extra_len(&self) -> usize {
        LittleEndian::read_u16(&self.raw[30..]) as usize
    }

    pub fn comment_len(&self) -> usize {
        LittleEndian::read_u16(&self.raw[32..]) as usize
    }

    pub fn local_header_offset(&self) -> u32 {
        LittleEndian::read_u32(&self.raw[42..])
    }

    /// Size of the whole header including name, extra field and comment.
    pub fn total_len(&self) -> usize {
        Self::SIZE + self.name_len() + self.extra_len() + self.comment_len()
    }

    /// Rejects the header if it is not one this reader can serve.
    pub fn validate(&self) -> Result<()> {
        if !self.has_signature() {
            return Err(Error::format("invalid CEN header (bad signature)"));
        }
        if self.flags() & FLAG_ENCRYPTED != 0 {
            return Err(Error::format("invalid CEN header (encrypted entry)"));
        }
        match CompressionMethod::from_u16(self.method()) {
            CompressionMethod::Stored | CompressionMethod::Deflate => Ok(()),
            CompressionMethod::Unknown(_) => {
                Err(Error::format("invalid CEN header (bad compression method)"))
            }
        }
    }
}

/// Local File Header (LFH) - 30 bytes
pub struct LocalHeader;

impl LocalHeader {
    pub const SIGNATURE: &'static [u8] = b"PK\x03\x04";
    pub const SIZE: usize = 30;

    /// Length of the variable part (name + extra) following the fixed
    /// prefix in `data`.
    pub fn variable_len(data: &[u8]) -> Result<u64> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            return Err(Error::format("invalid LOC header (bad signature)"));
        }
        let name_len = LittleEndian::read_u16(&data[26..]) as u64;
        let extra_len = LittleEndian::read_u16(&data[28..]) as u64;
        Ok(name_len + extra_len)
    }
}
