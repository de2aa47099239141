//! Synthetic archive builder shared by the integration tests.
//!
//! Output uses fixed timestamps and explicit sizes (no data descriptors).
//! Offsets inside the archive are relative to the start of the ZIP data, so
//! a prefix behaves like a self-extracting stub.

#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;

use flate2::Compression;
use flate2::write::DeflateEncoder;

pub const DOS_TIME: u16 = (13 << 11) | (45 << 5) | 15;
pub const DOS_DATE: u16 = (43 << 9) | (6 << 5) | 15;

#[derive(Clone)]
pub struct Member {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pub deflate: bool,
    /// Sentinel size, csize and offset in the central header, with the real
    /// values in a Zip64 extra block.
    pub zip64: bool,
    /// Extra field written only to the local header.
    pub local_extra: Vec<u8>,
    /// Raw extra field written only to the central header.
    pub central_extra: Vec<u8>,
    pub comment: Vec<u8>,
    pub flags: u16,
    pub method: Option<u16>,
}

impl Member {
    pub fn stored(name: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Self {
        Self {
            name: name.as_ref().to_vec(),
            data: data.as_ref().to_vec(),
            deflate: false,
            zip64: false,
            local_extra: Vec::new(),
            central_extra: Vec::new(),
            comment: Vec::new(),
            flags: 0,
            method: None,
        }
    }

    pub fn deflated(name: impl AsRef<[u8]>, data: impl AsRef<[u8]>) -> Self {
        Self {
            deflate: true,
            ..Self::stored(name, data)
        }
    }

    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn local_extra(mut self, extra: &[u8]) -> Self {
        self.local_extra = extra.to_vec();
        self
    }

    pub fn central_extra(mut self, extra: &[u8]) -> Self {
        self.central_extra = extra.to_vec();
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn method(mut self, method: u16) -> Self {
        self.method = Some(method);
        self
    }
}

#[derive(Default)]
pub struct ZipBuilder {
    pub members: Vec<Member>,
    pub prefix: Vec<u8>,
    pub comment: Vec<u8>,
    pub trailing: Vec<u8>,
    pub zip64_end: bool,
    pub declared_total: Option<u16>,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    pub fn prefix(mut self, prefix: &[u8]) -> Self {
        self.prefix = prefix.to_vec();
        self
    }

    pub fn comment(mut self, comment: &[u8]) -> Self {
        self.comment = comment.to_vec();
        self
    }

    pub fn trailing(mut self, trailing: &[u8]) -> Self {
        self.trailing = trailing.to_vec();
        self
    }

    pub fn zip64_end(mut self) -> Self {
        self.zip64_end = true;
        self
    }

    pub fn declared_total(mut self, total: u16) -> Self {
        self.declared_total = Some(total);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut body = Vec::new();
        let mut cen = Vec::new();

        for m in &self.members {
            let stored = if m.deflate {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&m.data).unwrap();
                encoder.finish().unwrap()
            } else {
                m.data.clone()
            };
            let method = m.method.unwrap_or(if m.deflate { 8 } else { 0 });
            let mut crc = flate2::Crc::new();
            crc.update(&m.data);
            let crc = crc.sum();
            let local_offset = body.len() as u64;

            body.extend_from_slice(b"PK\x03\x04");
            body.extend_from_slice(&20u16.to_le_bytes());
            body.extend_from_slice(&m.flags.to_le_bytes());
            body.extend_from_slice(&method.to_le_bytes());
            body.extend_from_slice(&DOS_TIME.to_le_bytes());
            body.extend_from_slice(&DOS_DATE.to_le_bytes());
            body.extend_from_slice(&crc.to_le_bytes());
            body.extend_from_slice(&(stored.len() as u32).to_le_bytes());
            body.extend_from_slice(&(m.data.len() as u32).to_le_bytes());
            body.extend_from_slice(&(m.name.len() as u16).to_le_bytes());
            body.extend_from_slice(&(m.local_extra.len() as u16).to_le_bytes());
            body.extend_from_slice(&m.name);
            body.extend_from_slice(&m.local_extra);
            body.extend_from_slice(&stored);

            let mut extra = m.central_extra.clone();
            let (csize, size, offset) = if m.zip64 {
                extra.extend_from_slice(&1u16.to_le_bytes());
                extra.extend_from_slice(&24u16.to_le_bytes());
                extra.extend_from_slice(&(m.data.len() as u64).to_le_bytes());
                extra.extend_from_slice(&(stored.len() as u64).to_le_bytes());
                extra.extend_from_slice(&local_offset.to_le_bytes());
                (u32::MAX, u32::MAX, u32::MAX)
            } else {
                (stored.len() as u32, m.data.len() as u32, local_offset as u32)
            };

            cen.extend_from_slice(b"PK\x01\x02");
            cen.extend_from_slice(&20u16.to_le_bytes());
            cen.extend_from_slice(&20u16.to_le_bytes());
            cen.extend_from_slice(&m.flags.to_le_bytes());
            cen.extend_from_slice(&method.to_le_bytes());
            cen.extend_from_slice(&DOS_TIME.to_le_bytes());
            cen.extend_from_slice(&DOS_DATE.to_le_bytes());
            cen.extend_from_slice(&crc.to_le_bytes());
            cen.extend_from_slice(&csize.to_le_bytes());
            cen.extend_from_slice(&size.to_le_bytes());
            cen.extend_from_slice(&(m.name.len() as u16).to_le_bytes());
            cen.extend_from_slice(&(extra.len() as u16).to_le_bytes());
            cen.extend_from_slice(&(m.comment.len() as u16).to_le_bytes());
            cen.extend_from_slice(&0u16.to_le_bytes());
            cen.extend_from_slice(&0u16.to_le_bytes());
            cen.extend_from_slice(&0u32.to_le_bytes());
            cen.extend_from_slice(&offset.to_le_bytes());
            cen.extend_from_slice(&m.name);
            cen.extend_from_slice(&extra);
            cen.extend_from_slice(&m.comment);
        }

        let cen_offset = body.len() as u64;
        let cen_size = cen.len() as u64;
        let total = self.members.len() as u64;
        body.extend_from_slice(&cen);

        let (legacy_total, legacy_size, legacy_offset) = if self.zip64_end {
            let end64_offset = body.len() as u64;
            body.extend_from_slice(b"PK\x06\x06");
            body.extend_from_slice(&44u64.to_le_bytes());
            body.extend_from_slice(&45u16.to_le_bytes());
            body.extend_from_slice(&45u16.to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes());
            body.extend_from_slice(&total.to_le_bytes());
            body.extend_from_slice(&total.to_le_bytes());
            body.extend_from_slice(&cen_size.to_le_bytes());
            body.extend_from_slice(&cen_offset.to_le_bytes());

            body.extend_from_slice(b"PK\x06\x07");
            body.extend_from_slice(&0u32.to_le_bytes());
            body.extend_from_slice(&end64_offset.to_le_bytes());
            body.extend_from_slice(&1u32.to_le_bytes());
            (u16::MAX, u32::MAX, u32::MAX)
        } else {
            (
                self.declared_total.unwrap_or(total as u16),
                cen_size as u32,
                cen_offset as u32,
            )
        };

        body.extend_from_slice(b"PK\x05\x06");
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&legacy_total.to_le_bytes());
        body.extend_from_slice(&legacy_total.to_le_bytes());
        body.extend_from_slice(&legacy_size.to_le_bytes());
        body.extend_from_slice(&legacy_offset.to_le_bytes());
        body.extend_from_slice(&(self.comment.len() as u16).to_le_bytes());
        body.extend_from_slice(&self.comment);

        let mut out = self.prefix.clone();
        out.extend_from_slice(&body);
        out.extend_from_slice(&self.trailing);
        out
    }

    /// Write the archive to a fresh temporary directory.
    pub fn write(&self, dir: &tempfile::TempDir, file_name: &str) -> PathBuf {
        let path = dir.path().join(file_name);
        std::fs::write(&path, self.build()).unwrap();
        path
    }
}

/// Deterministic, moderately compressible test payload.
pub fn payload(seed: u32, len: usize) -> Vec<u8> {
    let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if i % 3 == 0 { (state % 7) as u8 + b'a' } else { (state >> 24) as u8 }
        })
        .collect()
}
