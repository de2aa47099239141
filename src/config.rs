//! Tunables applied when an archive is opened.

/// Options controlling how an archive's central directory is loaded and read.
///
/// A registry applies the same options to every archive it opens.
///
/// ```
/// use zipcen::ArchiveOptions;
///
/// let options = ArchiveOptions::default()
///     .map_directory(false)
///     .inflate_chunk(64 * 1024);
/// assert!(!options.map_directory);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// Map the central directory into memory instead of reading it.
    /// Ignored by byte sources that cannot be mapped.
    pub map_directory: bool,
    /// Recount and re-parse when a directory holds more headers than its
    /// end record declares. When off such archives are rejected.
    pub recount_overflow: bool,
    /// Size of the first read when materializing a header on the random
    /// access path.
    pub header_guess: usize,
    /// Size of the page kept for sequential enumeration.
    pub page_size: usize,
    /// Compressed bytes pulled per locked read while inflating.
    pub inflate_chunk: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            map_directory: true,
            recount_overflow: true,
            header_guess: 256,
            page_size: 8192,
            inflate_chunk: 8192,
        }
    }
}

impl ArchiveOptions {
    pub fn map_directory(mut self, value: bool) -> Self {
        self.map_directory = value;
        self
    }

    pub fn recount_overflow(mut self, value: bool) -> Self {
        self.recount_overflow = value;
        self
    }

    pub fn header_guess(mut self, value: usize) -> Self {
        self.header_guess = value.max(1);
        self
    }

    pub fn page_size(mut self, value: usize) -> Self {
        self.page_size = value.max(1);
        self
    }

    pub fn inflate_chunk(mut self, value: usize) -> Self {
        self.inflate_chunk = value.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sizes_are_clamped() {
        let options = ArchiveOptions::default()
            .header_guess(0)
            .page_size(0)
            .inflate_chunk(0);
        assert_eq!(options.header_guess, 1);
        assert_eq!(options.page_size, 1);
        assert_eq!(options.inflate_chunk, 1);
    }
}
