//! Sharing open archives by path.
//!
//! Opening the same file twice returns the same [`Archive`] with its
//! reference count raised. An archive is published only after its central
//! directory has been parsed completely, so a failed open leaves nothing
//! behind for the next caller to trip over.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use crate::config::ArchiveOptions;
use crate::error::Result;
use crate::io::LocalFileReader;
use crate::zip::Archive;

/// A set of open archives keyed by canonical path and fingerprint.
///
/// Construct one explicitly and pass it to the code that needs it, or use
/// the process-wide [`ArchiveRegistry::global`] instance.
#[derive(Debug, Default)]
pub struct ArchiveRegistry {
    archives: Mutex<Vec<Arc<Archive>>>,
    options: ArchiveOptions,
}

impl ArchiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ArchiveOptions) -> Self {
        Self {
            archives: Mutex::default(),
            options,
        }
    }

    /// The process-wide registry, created on first use with default options
    /// and never torn down.
    pub fn global() -> &'static ArchiveRegistry {
        static GLOBAL: OnceLock<ArchiveRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ArchiveRegistry::new)
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Open the archive at `path`, reusing an already open one.
    ///
    /// `fingerprint` is typically the file's modification time (see
    /// [`crate::io::fingerprint`]). An open archive is reused only if its
    /// fingerprint equals the requested one; 0 on either side matches
    /// anything.
    pub fn open(&self, path: impl AsRef<Path>, fingerprint: u64) -> Result<Arc<Archive>> {
        let canonical = std::fs::canonicalize(path.as_ref())?;

        if let Some(archive) = self.find(&self.lock(), &canonical, fingerprint) {
            tracing::trace!(path = %canonical.display(), "archive reused");
            return Ok(archive);
        }

        let reader = LocalFileReader::new(&canonical)?;
        let archive = Archive::build(
            canonical.display().to_string(),
            Some(canonical.clone()),
            fingerprint,
            Box::new(reader),
            self.options,
        )?;

        let mut archives = self.lock();
        // Another thread may have published the same file meanwhile.
        if let Some(existing) = self.find(&archives, &canonical, fingerprint) {
            tracing::debug!(path = %canonical.display(), "lost open race, using published archive");
            return Ok(existing);
        }
        let archive = Arc::new(archive);
        archives.insert(0, Arc::clone(&archive));
        Ok(archive)
    }

    /// Give up one handle. The last close removes the archive from the
    /// registry and frees everything it holds.
    pub fn close(&self, archive: Arc<Archive>) {
        let mut archives = self.lock();
        if archive.release() > 0 {
            return;
        }
        archives.retain(|a| !Arc::ptr_eq(a, &archive));
        drop(archives);
        archive.tear_down();
    }

    /// Number of archives currently registered.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn find(
        &self,
        archives: &[Arc<Archive>],
        path: &Path,
        fingerprint: u64,
    ) -> Option<Arc<Archive>> {
        let archive = archives.iter().find(|a| a.matches(path, fingerprint))?;
        archive.acquire();
        Some(Arc::clone(archive))
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<Archive>>> {
        self.archives.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("archive registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
