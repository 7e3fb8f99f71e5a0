//! The archive controller.
//!
//! [`ZipArchive`] owns one archive file for the length of a session. Its
//! entry index and free-space allocator live behind a mutex, so a handle
//! can be shared across threads; calls are serialized.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► Open ──(add / delete / list / read / flush)──► Open ──close──► Closed
//! ```
//!
//! Every operation on a closed handle fails with [`Error::InvalidState`].
//! Dropping an open handle commits best-effort and logs a warning if that
//! fails; call [`ZipArchive::close`] to observe the result.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipmend::{CompressionMethod, ZipArchive};
//!
//! let archive = ZipArchive::open("app.apk")?;
//! archive.add_bytes("lib/arm64-v8a/libapp.so", &[0u8; 8192], CompressionMethod::Stored, 4096)?;
//! archive.delete("assets/old.bin")?;
//! for entry in archive.list()? {
//!     println!("{:>10} {:#x} {}", entry.compressed_size, entry.offset, entry.name);
//! }
//! archive.close()?;
//! # Ok::<(), zipmend::Error>(())
//! ```

mod commit;
mod layout;
mod mutate;
mod open;

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub use layout::{Layout, Span, SpanKind};

use crate::codec::CompressionMethod;
use crate::format::MAX_COMMENT_LEN;
use crate::free_space::FreeSpaceAllocator;
use crate::index::{Entry, EntryIndex};
use crate::options::{ArchiveOptions, EntryOptions};
use crate::prepare::PreparedEntry;
use crate::read::{ArchiveReader, EntryView, NestedSource, decode_payload};
use crate::{Error, Result};

/// Recovers the guard from a poisoned mutex.
///
/// Session state is only replaced after a mutation's bytes are written, so
/// a panic in another thread cannot leave it half-updated.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("archive session mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Rejects comments the end record cannot hold.
fn check_comment(comment: &[u8]) -> Result<()> {
    if comment.len() > MAX_COMMENT_LEN {
        return Err(Error::InvalidComment { len: comment.len() });
    }
    Ok(())
}

/// Location of the central directory and end records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrailerSpan {
    offset: u64,
    length: u64,
}

/// State of an open archive.
#[derive(Debug)]
struct Session {
    file: File,
    index: EntryIndex,
    free: FreeSpaceAllocator,
    /// The trailer currently on disk. `None` once a mutation has reclaimed it.
    trailer: Option<TrailerSpan>,
    comment: Vec<u8>,
    /// Set when the on-disk directory no longer describes `index`.
    dirty: bool,
}

/// An archive file open for incremental editing.
#[derive(Debug)]
pub struct ZipArchive {
    path: PathBuf,
    options: ArchiveOptions,
    session: Mutex<Option<Session>>,
}

impl ZipArchive {
    /// Opens an archive with default options, creating it if missing.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedArchive`] if the trailer or directory cannot be
    ///   parsed, or entry spans overlap
    /// - [`Error::UnsupportedFeature`] for encrypted or spanned archives
    /// - [`Error::Io`] if the file cannot be opened
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ArchiveOptions::default())
    }

    /// Opens an archive with the given options.
    ///
    /// A missing or empty file starts an empty archive; its directory is
    /// written on the first commit.
    ///
    /// # Errors
    ///
    /// As [`open`](Self::open), plus [`Error::InvalidComment`] if
    /// `options.comment` is longer than 65535 bytes.
    pub fn open_with_options(path: impl AsRef<Path>, options: ArchiveOptions) -> Result<Self> {
        if let Some(comment) = &options.comment {
            check_comment(comment)?;
        }
        let path = path.as_ref().to_path_buf();
        let session = Session::open(&path, &options)?;
        Ok(Self {
            path,
            options,
            session: Mutex::new(Some(session)),
        })
    }

    /// Path the archive was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options of this session.
    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Returns `true` until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        lock_or_recover(&self.session).is_some()
    }

    fn with_session<T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Session) -> Result<T>,
    ) -> Result<T> {
        let mut guard = lock_or_recover(&self.session);
        let session = guard.as_mut().ok_or(Error::InvalidState { operation })?;
        f(session)
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        self.with_session(operation, |_| Ok(()))
    }

    /// Adds or replaces an entry with content read from `source`.
    ///
    /// The source is read once. Encoding happens before the session lock is
    /// taken; only placement and the write hold it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the archive is closed
    /// - [`Error::InvalidEntryName`] or [`Error::InvalidAlignment`] for bad input
    /// - [`Error::Io`] if reading the source or writing the file fails; the
    ///   archive's entries are unchanged in that case
    pub fn add(
        &self,
        name: &str,
        source: &mut dyn Read,
        method: CompressionMethod,
        alignment: u64,
    ) -> Result<Entry> {
        self.ensure_open("add to")?;
        let options = EntryOptions::new().method(method).alignment(alignment)?;
        self.add_with_options(name, source, &options)
    }

    /// Adds or replaces an entry using per-entry options.
    pub fn add_with_options(
        &self,
        name: &str,
        source: &mut dyn Read,
        options: &EntryOptions,
    ) -> Result<Entry> {
        self.ensure_open("add to")?;
        let prepared = PreparedEntry::prepare(name, source, options, &self.options)?;
        self.add_prepared(prepared)
    }

    /// Adds or replaces an entry from memory.
    pub fn add_bytes(
        &self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
        alignment: u64,
    ) -> Result<Entry> {
        self.add(name, &mut &data[..], method, alignment)
    }

    /// Adds or replaces an entry with the content of a file on disk.
    pub fn add_path(
        &self,
        name: &str,
        path: impl AsRef<Path>,
        method: CompressionMethod,
        alignment: u64,
    ) -> Result<Entry> {
        self.ensure_open("add to")?;
        let options = EntryOptions::new().method(method).alignment(alignment)?;
        let prepared = PreparedEntry::from_path(name, path.as_ref(), &options, &self.options)?;
        self.add_prepared(prepared)
    }

    /// Places an already prepared entry.
    pub fn add_prepared(&self, prepared: PreparedEntry) -> Result<Entry> {
        self.with_session("add to", |session| {
            session.add(prepared, self.options.sync_on_commit)
        })
    }

    /// Removes an entry.
    ///
    /// # Errors
    ///
    /// [`Error::EntryNotFound`] if no entry has this name.
    pub fn delete(&self, name: &str) -> Result<()> {
        self.with_session("delete from", |session| session.delete(name))
    }

    /// Snapshot of all entries in on-disk order.
    pub fn list(&self) -> Result<Vec<Entry>> {
        self.with_session("list", |session| {
            Ok(session.index.entries_in_disk_order().cloned().collect())
        })
    }

    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Result<Entry> {
        self.with_session("look up", |session| {
            session
                .index
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found(name))
        })
    }

    /// Returns `true` if an entry named `name` exists.
    pub fn contains(&self, name: &str) -> Result<bool> {
        self.with_session("look up", |session| Ok(session.index.contains(name)))
    }

    /// Number of entries.
    pub fn len(&self) -> Result<usize> {
        self.with_session("count", |session| Ok(session.index.len()))
    }

    /// Returns `true` if the archive holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Archive comment that the next commit will write.
    pub fn comment(&self) -> Result<Vec<u8>> {
        self.with_session("read the comment of", |session| Ok(session.comment.clone()))
    }

    /// Replaces the archive comment.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidComment`] if `comment` is longer than 65535 bytes; the
    /// current comment is kept.
    pub fn set_comment(&self, comment: &[u8]) -> Result<()> {
        self.with_session("set the comment of", |session| {
            check_comment(comment)?;
            if session.comment != comment {
                session.comment = comment.to_vec();
                session.dirty = true;
            }
            Ok(())
        })
    }

    /// Decodes an entry's content, verifying its CRC-32.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.with_session("read from", |session| {
            let entry = session
                .index
                .get(name)
                .cloned()
                .ok_or_else(|| Error::not_found(name))?;
            let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
            let mut reader = BufReader::new(&session.file);
            decode_payload(&mut reader, &entry, &mut out)?;
            Ok(out)
        })
    }

    /// Opens an entry holding an archive as a read-only [`ArchiveReader`].
    ///
    /// Stored entries are read in place through the parent handle. Other
    /// entries are decoded into memory first.
    pub fn nested(&self, name: &str) -> Result<ArchiveReader<NestedSource<'_>>> {
        let entry = self.get(name)?;
        let source = if entry.method == CompressionMethod::Stored {
            NestedSource::Borrowed(EntryView::new(
                self,
                entry.payload_offset,
                entry.compressed_size,
            ))
        } else {
            NestedSource::Inflated(Cursor::new(self.read(name)?))
        };
        ArchiveReader::new(source)
    }

    /// Reads file bytes at `offset` for borrowed views.
    pub(crate) fn read_at(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut guard = lock_or_recover(&self.session);
        let session = guard.as_mut().ok_or_else(|| {
            std::io::Error::other(Error::InvalidState {
                operation: "read from",
            })
        })?;
        session.file.seek(SeekFrom::Start(offset))?;
        session.file.read(buf)
    }

    /// Current byte layout of the file.
    pub fn layout(&self) -> Result<Layout> {
        self.with_session("inspect", |session| Ok(session.layout()))
    }

    /// Writes a fresh central directory and trailer, keeping the handle open.
    ///
    /// Does nothing if nothing changed since the last commit.
    pub fn flush(&self) -> Result<()> {
        self.with_session("flush", |session| session.commit(&self.options))
    }

    /// Commits and releases the file.
    ///
    /// The file is released even if the commit fails.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the archive was already closed, or the
    /// commit error.
    pub fn close(&self) -> Result<()> {
        let session = lock_or_recover(&self.session).take();
        let mut session = session.ok_or(Error::InvalidState { operation: "close" })?;
        session.commit(&self.options)
    }
}

impl Drop for ZipArchive {
    fn drop(&mut self) {
        if let Some(mut session) = lock_or_recover(&self.session).take() {
            if let Err(err) = session.commit(&self.options) {
                log::warn!(
                    "failed to commit {} on drop: {}",
                    self.path.display(),
                    err
                );
            }
        }
    }
}
