//! # zipcen
//!
//! A ZIP and Zip64 archive reader built around an indexed central directory.
//!
//! Archives are opened through an [`ArchiveRegistry`], which shares one
//! [`Archive`] between every caller opening the same file. Members are
//! found by name through a compact hash index, materialized on demand, and
//! read back raw or inflated. An archive can be used from many threads at
//! once.
//!
//! ## Features
//!
//! - Tolerates stub prefixes (self-extracting archives) and trailing data
//! - Zip64 end records and per-member Zip64 extra fields
//! - STORED and DEFLATE members
//! - Directory lookup with an automatic trailing `/` retry
//! - Local files (optionally memory-mapped) and HTTP Range sources
//!
//! ## Example
//!
//! ```no_run
//! use zipcen::ArchiveRegistry;
//!
//! fn main() -> zipcen::Result<()> {
//!     let registry = ArchiveRegistry::new();
//!     let archive = registry.open("archive.zip", 0)?;
//!
//!     if let Some(mut entry) = archive.get_entry(b"docs/readme.txt", false)? {
//!         let data = archive.read_entry(&mut entry)?;
//!         println!("{}", String::from_utf8_lossy(&data));
//!         archive.release_entry(entry);
//!     }
//!
//!     registry.close(archive);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod registry;
pub mod zip;

pub use cli::Cli;
pub use config::ArchiveOptions;
pub use error::{Error, Result};
pub use io::{HttpRangeReader, LocalFileReader, ReadAt};
pub use registry::ArchiveRegistry;
pub use zip::{Archive, DataOffset, Entry};
