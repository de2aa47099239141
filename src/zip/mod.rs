//! ZIP archive parsing and member access.
//!
//! ## Architecture
//!
//! - [`structures`]: fixed-layout records (end records, headers)
//! - [`locator`]: finding the end record in a possibly padded file
//! - [`central`]: walking the central directory into an [`EntryIndex`]
//! - [`index`]: hash chains from name to header position
//! - [`materialize`]: turning a header position into an [`Entry`]
//! - [`reader`]: data offsets, bounds-checked reads, raw inflate
//! - [`archive`]: the shared, locked [`Archive`] tying it all together
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is found first, from the end of the file, then the Central
//! Directory is indexed. Member headers are re-read on demand instead of
//! being kept in memory.
//!
//! ## Limitations
//!
//! - No encryption support (encrypted entries are rejected)
//! - No multi-disk archive support
//! - Only STORED and DEFLATE compression methods

pub mod archive;
pub mod central;
pub mod entry;
pub mod index;
pub mod locator;
pub mod materialize;
pub mod reader;
pub mod structures;

pub use archive::{Archive, Entries};
pub use entry::{DataOffset, Entry};
pub use index::EntryIndex;
pub use structures::CompressionMethod;
