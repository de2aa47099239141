//! A shared, indexed open archive.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::config::ArchiveOptions;
use crate::error::{Error, Result, alloc_buffer};
use crate::io::ReadAt;

use super::central::read_central_directory;
use super::entry::Entry;
use super::index::{EntryIndex, SEPARATOR, hash_append, hash_name};
use super::materialize::{
    DirectoryRegion, MappedDirectory, PageCache, RandomAccess, Sequential, materialize,
};
use super::reader::{check_extent, inflate, read_raw, resolve_data_offset};

/// Source of archive ids; 0 is never handed out.
static NEXT_ARCHIVE_ID: AtomicU64 = AtomicU64::new(1);

/// An open ZIP archive.
///
/// All methods take `&self`; the archive is meant to be shared across
/// threads behind an `Arc`. Index structures, both caches and the byte
/// source sit behind one lock. Entries handed out are owned by the caller.
pub struct Archive {
    id: u64,
    name: String,
    path: Option<PathBuf>,
    fingerprint: u64,
    len: u64,
    total: usize,
    first_local_header: u64,
    zip64: bool,
    options: ArchiveOptions,
    refs: AtomicUsize,
    state: Mutex<ArchiveState>,
}

struct ArchiveState {
    /// `None` once the archive has been torn down.
    open: Option<OpenState>,
    last_error: Option<String>,
}

struct OpenState {
    source: Box<dyn ReadAt>,
    index: EntryIndex,
    region: DirectoryRegion,
    mapped: Option<MappedDirectory>,
    comment: Option<Vec<u8>>,
    meta_names: Vec<Vec<u8>>,
    cached_entry: Option<Entry>,
    page: PageCache,
}

impl Archive {
    /// Parse the archive held by `source`.
    ///
    /// `name` identifies the archive in messages. The archive is not
    /// registered anywhere; use
    /// [`ArchiveRegistry::open`](crate::ArchiveRegistry::open) to share
    /// archives by path.
    pub fn from_source(
        name: impl Into<String>,
        source: Box<dyn ReadAt>,
        options: ArchiveOptions,
    ) -> Result<Self> {
        Self::build(name.into(), None, 0, source, options)
    }

    pub(crate) fn build(
        name: String,
        path: Option<PathBuf>,
        fingerprint: u64,
        source: Box<dyn ReadAt>,
        options: ArchiveOptions,
    ) -> Result<Self> {
        let directory = read_central_directory(source.as_ref(), &options)?;
        let len = source.size();
        let total = directory.index.len();

        tracing::debug!(
            %name,
            total,
            len,
            mapped = directory.mapped.is_some(),
            "opened archive"
        );

        Ok(Self {
            id: NEXT_ARCHIVE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            path,
            fingerprint,
            len,
            total,
            first_local_header: directory.first_local_header,
            zip64: directory.zip64,
            options,
            refs: AtomicUsize::new(1),
            state: Mutex::new(ArchiveState {
                open: Some(OpenState {
                    source,
                    index: directory.index,
                    region: directory.region,
                    mapped: directory.mapped,
                    comment: directory.comment,
                    meta_names: directory.meta_names,
                    cached_entry: None,
                    page: PageCache::default(),
                }),
                last_error: None,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical path, for archives opened through a registry.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Total length of the archive file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Number of members.
    pub fn entry_count(&self) -> usize {
        self.total
    }

    /// Length of any stub preceding the ZIP data.
    pub fn first_local_header(&self) -> u64 {
        self.first_local_header
    }

    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Number of registry handles currently sharing this archive.
    pub fn ref_count(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().open.is_none()
    }

    /// Message of the most recent failed call on this archive, cleared by
    /// the next call that succeeds.
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    /// The archive comment, if any.
    pub fn comment(&self) -> Result<Option<Vec<u8>>> {
        self.with_open(|open| Ok(open.comment.clone()))
    }

    /// Names under the `META-INF/` prefix, in directory order.
    pub fn meta_names(&self) -> Result<Vec<Vec<u8>>> {
        self.with_open(|open| Ok(open.meta_names.clone()))
    }

    /// Look up a member by its exact name.
    ///
    /// With `allow_dir_suffix`, a miss on `name` is retried once as
    /// `name/`. Returns `Ok(None)` when nothing matches.
    pub fn get_entry(&self, name: &[u8], allow_dir_suffix: bool) -> Result<Option<Entry>> {
        let guess = self.options.header_guess;
        let first_local_header = self.first_local_header;
        self.with_open(|open| open.lookup(name, allow_dir_suffix, first_local_header, guess))
            .map(|found| found.map(|entry| self.adopt(entry)))
    }

    /// The member at position `index` in directory order, or `None` past the
    /// end. Consecutive indices are served from a page cache.
    pub fn next_entry(&self, index: usize) -> Result<Option<Entry>> {
        let page_size = self.options.page_size;
        let first_local_header = self.first_local_header;
        self.with_open(|open| open.next_entry(index, first_local_header, page_size))
            .map(|found| found.map(|entry| self.adopt(entry)))
    }

    /// Iterate over every member in directory order.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            archive: self,
            next: 0,
        }
    }

    /// Hand an entry back. It becomes the archive's single cached entry,
    /// replacing the one held before. Entries from another archive are
    /// dropped.
    pub fn release_entry(&self, entry: Entry) {
        if entry.owner != self.id {
            tracing::trace!(name = %self.name, "ignoring entry released to the wrong archive");
            return;
        }
        if let Some(open) = self.lock().open.as_mut() {
            open.cached_entry = Some(entry);
        }
    }

    /// Absolute offset of the first data byte of `entry`.
    pub fn data_offset(&self, entry: &mut Entry) -> Result<u64> {
        self.with_open(|open| resolve_data_offset(open.source.as_ref(), entry))
    }

    /// Read raw stored bytes of `entry` starting at `pos` into `buf`.
    ///
    /// For a deflated member these are compressed bytes. The read is
    /// clipped to the end of the member; `pos` at or past the end is an
    /// error. An empty `buf` returns 0 immediately.
    pub fn read(&self, entry: &mut Entry, pos: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let len = self.len;
        self.with_open(|open| read_raw(open.source.as_ref(), len, entry, pos, buf))
    }

    /// Read the whole member, inflating it if needed.
    ///
    /// While inflating, the archive lock is taken once per compressed
    /// chunk so other threads can use the archive in between.
    pub fn read_entry(&self, entry: &mut Entry) -> Result<Vec<u8>> {
        // Reject sizes the file cannot hold before allocating for them.
        if entry.stored_len() != 0 {
            let len = self.len;
            self.with_open(|open| check_extent(open.source.as_ref(), len, entry))?;
        }

        if entry.compressed_size() != 0 {
            let result = inflate(entry, self.options.inflate_chunk, |entry, pos, buf| {
                self.read(entry, pos, buf)
            });
            if let Err(e) = &result {
                self.record_error(e);
            }
            return result;
        }

        let size = usize::try_from(entry.size())
            .map_err(|_| Error::OutOfMemory(format!("entry of {} bytes", entry.size())))?;
        let mut out = alloc_buffer(size, "entry data")?;
        let mut pos = 0;
        while pos < size {
            let n = self.read(entry, pos as u64, &mut out[pos..])?;
            pos += n;
        }
        Ok(out)
    }

    /// Drop every sub-structure and the byte source.
    pub(crate) fn tear_down(&self) {
        let mut state = self.lock();
        if state.open.take().is_some() {
            tracing::debug!(name = %self.name, "archive torn down");
        }
    }

    pub(crate) fn matches(&self, path: &Path, fingerprint: u64) -> bool {
        self.path.as_deref() == Some(path)
            && (fingerprint == 0 || self.fingerprint == 0 || fingerprint == self.fingerprint)
    }

    pub(crate) fn acquire(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference, returning how many remain.
    pub(crate) fn release(&self) -> usize {
        let previous = self
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
            .unwrap_or(0);
        previous.saturating_sub(1)
    }

    fn adopt(&self, mut entry: Entry) -> Entry {
        entry.owner = self.id;
        entry
    }

    fn lock(&self) -> MutexGuard<'_, ArchiveState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(name = %self.name, "archive lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn record_error(&self, error: &Error) {
        self.lock().last_error = Some(error.to_string());
    }

    /// Run `f` on the open state, keeping `last_error` in step with the
    /// outcome.
    fn with_open<T>(&self, f: impl FnOnce(&mut OpenState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let result = match state.open.as_mut() {
            Some(open) => f(open),
            None => Err(Error::Closed),
        };
        state.last_error = result.as_ref().err().map(|e| e.to_string());
        result
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("total", &self.total)
            .field("refs", &self.ref_count())
            .finish()
    }
}

impl OpenState {
    fn lookup(
        &mut self,
        name: &[u8],
        allow_dir_suffix: bool,
        first_local_header: u64,
        guess: usize,
    ) -> Result<Option<Entry>> {
        let mut hash = hash_name(name);
        let mut name = Cow::Borrowed(name);
        let mut retry = allow_dir_suffix;

        loop {
            if self
                .cached_entry
                .as_ref()
                .is_some_and(|cached| cached.hash == hash && cached.name == *name)
            {
                tracing::trace!("entry served from single-entry cache");
                return Ok(self.cached_entry.take());
            }

            if let Some(entry) = self.find(&name, hash, first_local_header, guess)? {
                return Ok(Some(entry));
            }

            if !retry || name.is_empty() || name.last() == Some(&SEPARATOR) {
                return Ok(None);
            }
            hash = hash_append(hash, SEPARATOR);
            name.to_mut().push(SEPARATOR);
            retry = false;
        }
    }

    /// Walk the bucket chain for `hash`, confirming candidates by name.
    fn find(
        &self,
        name: &[u8],
        hash: u32,
        first_local_header: u64,
        guess: usize,
    ) -> Result<Option<Entry>> {
        let mut headers = RandomAccess::new(self.source.as_ref(), self.region, self.mapped.as_ref());
        for (index, cell) in self.index.candidates(hash) {
            let entry = materialize(&mut headers, &cell, index, first_local_header, guess)?;
            if entry.name.len() == name.len() && entry.name == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn next_entry(
        &mut self,
        index: usize,
        first_local_header: u64,
        page_size: usize,
    ) -> Result<Option<Entry>> {
        let Some(cell) = self.index.cell(index).copied() else {
            return Ok(None);
        };
        let mut headers = Sequential::new(
            self.source.as_ref(),
            self.region,
            self.mapped.as_ref(),
            &mut self.page,
            page_size,
        );
        materialize(&mut headers, &cell, index, first_local_header, page_size).map(Some)
    }
}

/// Iterator over all members, see [`Archive::entries`].
pub struct Entries<'a> {
    archive: &'a Archive,
    next: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.archive.next_entry(self.next) {
            Ok(Some(entry)) => {
                self.next += 1;
                Some(Ok(entry))
            }
            Ok(None) => None,
            Err(e) => {
                self.next = usize::MAX;
                Some(Err(e))
            }
        }
    }
}
