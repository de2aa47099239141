//! Error types for archive operations.
//!
//! Every fallible operation in the library returns [`Result<T>`]. A lookup
//! that finds nothing is not an error: it returns `Ok(None)`.

use std::io;

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of the central directory engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad signature, disallowed flag or method, inconsistent header sizes,
    /// malformed Zip64 extra data.
    #[error("{0}")]
    Format(String),

    /// The byte source failed to seek or read.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A computed byte range runs past the end of the archive.
    #[error("corrupt zip file: {0}")]
    Corruption(String),

    /// The deflate stream is corrupt or does not match the declared size.
    #[error("{0}")]
    Decompression(String),

    /// An allocation sized from archive metadata could not be satisfied.
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The archive has been closed and torn down.
    #[error("zip file closed")]
    Closed,
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    pub(crate) fn decompression(msg: impl Into<String>) -> Self {
        Error::Decompression(msg.into())
    }

    /// Returns `true` for errors caused by the archive contents rather than
    /// by the environment.
    pub fn is_corrupt_archive(&self) -> bool {
        matches!(
            self,
            Error::Format(_) | Error::Corruption(_) | Error::Decompression(_)
        )
    }
}

/// Allocates a zeroed buffer, reporting allocation failure instead of
/// aborting. Sizes here come from untrusted headers.
pub(crate) fn alloc_buffer(len: usize, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::OutOfMemory(format!("{} ({} bytes)", what, len)))?;
    buf.resize(len, 0);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_convert() {
        let err: Error = io::Error::new(io::ErrorKind::UnexpectedEof, "short").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_corrupt_archive());
    }

    #[test]
    fn format_messages_are_verbatim() {
        let err = Error::format("invalid CEN header (bad signature)");
        assert_eq!(err.to_string(), "invalid CEN header (bad signature)");
        assert!(err.is_corrupt_archive());
    }

    #[test]
    fn huge_allocation_is_reported() {
        let err = alloc_buffer(usize::MAX, "central directory").unwrap_err();
        assert!(matches!(err, Error::OutOfMemory(_)));
    }
}
