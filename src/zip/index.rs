//! Name lookup over the central directory.
//!
//! The index is an arena of [`HashCell`]s plus a bucket array of chain heads.
//! Cells store only the name hash and the header position, never the name
//! itself, so an archive with millions of members costs 16 bytes per member.
//! Candidates are confirmed by reading their header back.

use crate::error::{Error, Result};

/// Largest member count the index accepts.
pub const MAX_ENTRIES: u64 = 0x7FFF_FFFF;

/// Separator used for the directory-suffix retry.
pub const SEPARATOR: u8 = b'/';

/// A chain link: the index of the next cell, or end of chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link(u32);

impl Link {
    pub const END: Link = Link(u32::MAX);

    fn to(index: usize) -> Self {
        Link(index as u32)
    }

    pub fn get(self) -> Option<usize> {
        if self == Link::END {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

/// One member of the archive, as far as lookup is concerned.
#[derive(Debug, Clone, Copy)]
pub struct HashCell {
    pub hash: u32,
    pub next: Link,
    /// Absolute offset of the member's central directory header.
    pub header_pos: u64,
}

/// Polynomial name hash, `h = 31 * h + byte`.
pub fn hash_name(name: &[u8]) -> u32 {
    name.iter().fold(0, |h, &b| hash_append(h, b))
}

/// Extend a hash by one byte without rehashing the prefix.
pub fn hash_append(hash: u32, byte: u8) -> u32 {
    hash.wrapping_mul(31).wrapping_add(byte as u32)
}

/// Bucket count for `total` members; always odd.
pub fn table_len_for(total: usize) -> usize {
    (total / 2) | 1
}

#[derive(Debug, Default)]
pub struct EntryIndex {
    cells: Vec<HashCell>,
    table: Vec<Link>,
}

impl EntryIndex {
    /// Allocate an index for exactly `total` members.
    pub fn with_capacity(total: u64) -> Result<Self> {
        if total > MAX_ENTRIES {
            return Err(Error::format("invalid END header (too many entries)"));
        }
        let total = total as usize;
        let table_len = table_len_for(total);

        let mut cells = Vec::new();
        cells
            .try_reserve_exact(total)
            .map_err(|_| Error::OutOfMemory(format!("index of {} entries", total)))?;
        let mut table = Vec::new();
        table
            .try_reserve_exact(table_len)
            .map_err(|_| Error::OutOfMemory(format!("hash table of {} buckets", table_len)))?;
        table.resize(table_len, Link::END);

        Ok(Self { cells, table })
    }

    /// Append a member and link it at the head of its bucket.
    pub fn push(&mut self, hash: u32, header_pos: u64) {
        let index = self.cells.len();
        let bucket = hash as usize % self.table.len();
        self.cells.push(HashCell {
            hash,
            next: self.table[bucket],
            header_pos,
        });
        self.table[bucket] = Link::to(index);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    pub fn cell(&self, index: usize) -> Option<&HashCell> {
        self.cells.get(index)
    }

    /// Cells whose hash equals `hash`, most recently added first.
    pub fn candidates(&self, hash: u32) -> Candidates<'_> {
        let head = if self.table.is_empty() {
            Link::END
        } else {
            self.table[hash as usize % self.table.len()]
        };
        Candidates {
            index: self,
            hash,
            link: head,
        }
    }
}

/// Iterator over one bucket chain, filtered by exact hash.
pub struct Candidates<'a> {
    index: &'a EntryIndex,
    hash: u32,
    link: Link,
}

impl Iterator for Candidates<'_> {
    /// Position in the arena and the cell itself.
    type Item = (usize, HashCell);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(i) = self.link.get() {
            let cell = self.index.cells[i];
            self.link = cell.next;
            if cell.hash == self.hash {
                return Some((i, cell));
            }
        }
        None
    }
}
