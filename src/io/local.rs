use super::ReadAt;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Local file reader with random access support
pub struct LocalFileReader {
    #[cfg(any(unix, windows))]
    file: File,
    #[cfg(not(any(unix, windows)))]
    file: std::sync::Mutex<File>,
    size: u64,
    modified: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let size = metadata.len();
        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        #[cfg(not(any(unix, windows)))]
        let file = std::sync::Mutex::new(file);

        Ok(Self {
            file,
            size,
            modified,
        })
    }

    /// Last modification time in milliseconds since the Unix epoch, or 0 if
    /// the platform does not report one.
    pub fn modified(&self) -> u64 {
        self.modified
    }
}

/// Fingerprint of the file at `path`: its modification time in milliseconds,
/// or 0 when unknown.
pub fn fingerprint(path: &Path) -> u64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl ReadAt for LocalFileReader {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = self
                .file
                .lock()
                .map_err(|_| io::Error::other("file lock poisoned"))?;
            file.seek(SeekFrom::Start(offset))?;
            file.read(buf)
        }
    }

    fn size(&self) -> u64 {
        self.size
    }

    #[cfg(any(unix, windows))]
    fn map(&self, offset: u64, len: usize) -> io::Result<Option<Mmap>> {
        if len == 0 {
            return Ok(None);
        }
        // SAFETY: the mapping is read-only and archives are not expected to
        // be rewritten in place while open.
        let map = unsafe { MmapOptions::new().offset(offset).len(len).map(&self.file)? };
        Ok(Some(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_and_maps_a_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"0123456789abcdef").unwrap();
        tmp.flush().unwrap();

        let reader = LocalFileReader::new(tmp.path()).unwrap();
        assert_eq!(reader.size(), 16);
        assert_ne!(reader.modified(), 0);
        assert_eq!(reader.modified(), fingerprint(tmp.path()));

        let mut buf = [0u8; 4];
        reader.read_exact_at(10, &mut buf).unwrap();
        assert_eq!(&buf, b"abcd");

        #[cfg(any(unix, windows))]
        {
            let map = reader.map(3, 5).unwrap().unwrap();
            assert_eq!(&map[..], b"34567");
        }
    }

    #[test]
    fn missing_file_has_no_fingerprint() {
        assert_eq!(fingerprint(Path::new("/definitely/not/here.zip")), 0);
    }
}
