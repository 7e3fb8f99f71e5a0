//! Archive and entry configuration.

use crate::codec::CompressionMethod;
use crate::codec::spool::DEFAULT_SPOOL_THRESHOLD;
use crate::format::extra::is_valid_alignment;
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

/// Options for an archive editing session.
///
/// # Example
///
/// ```rust
/// use zipmend::ArchiveOptions;
///
/// let options = ArchiveOptions::new()
///     .deflate_level(9)?
///     .fill_gaps(true)
///     .sync_on_commit(false)
///     .comment(b"built by ci".to_vec());
/// assert_eq!(options.deflate_level, 9);
/// # Ok::<(), zipmend::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    /// DEFLATE level (0-9).
    pub deflate_level: u32,
    /// Encoded payloads larger than this are spooled to a temporary file.
    pub spool_threshold: usize,
    /// Write filler records into free regions when committing.
    pub fill_gaps: bool,
    /// Sync file data after each entry write and `fsync` after the
    /// directory is written.
    pub sync_on_commit: bool,
    /// Stamp for entries that do not set their own.
    pub last_modified: DosDateTime,
    /// Replacement archive comment. `None` keeps the existing one.
    pub comment: Option<Vec<u8>>,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            deflate_level: 6,
            spool_threshold: DEFAULT_SPOOL_THRESHOLD,
            fill_gaps: false,
            sync_on_commit: true,
            last_modified: DosDateTime::EPOCH,
            comment: None,
        }
    }
}

impl ArchiveOptions {
    /// Creates options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the DEFLATE level.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCompressionLevel`] if `level` is greater than 9.
    pub fn deflate_level(mut self, level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel { level });
        }
        self.deflate_level = level;
        Ok(self)
    }

    /// Sets the in-memory spool threshold in bytes.
    pub fn spool_threshold(mut self, bytes: usize) -> Self {
        self.spool_threshold = bytes;
        self
    }

    /// Enables or disables gap filling at commit.
    ///
    /// Free regions of at least 30 bytes are covered by nameless local
    /// headers whose extra field spans the region, so readers that walk
    /// local headers sequentially can step over them. Smaller regions are
    /// zero filled. Filler records are not listed in the central directory.
    pub fn fill_gaps(mut self, enabled: bool) -> Self {
        self.fill_gaps = enabled;
        self
    }

    /// Enables or disables syncing after entry writes and commits.
    ///
    /// When enabled, an entry's bytes reach the disk before the entry
    /// becomes part of the session.
    pub fn sync_on_commit(mut self, enabled: bool) -> Self {
        self.sync_on_commit = enabled;
        self
    }

    /// Sets the default last-modified stamp for new entries.
    pub fn last_modified(mut self, stamp: DosDateTime) -> Self {
        self.last_modified = stamp;
        self
    }

    /// Replaces the archive comment on the next commit.
    ///
    /// Opening fails with [`Error::InvalidComment`](crate::Error::InvalidComment)
    /// if the comment is longer than 65535 bytes.
    pub fn comment(mut self, comment: Vec<u8>) -> Self {
        self.comment = Some(comment);
        self
    }
}

/// Options for a single entry.
///
/// ```rust
/// use zipmend::{CompressionMethod, EntryOptions};
///
/// let options = EntryOptions::new()
///     .method(CompressionMethod::Stored)
///     .alignment(4096)?;
/// assert_eq!(options.alignment, 4096);
/// assert!(EntryOptions::new().alignment(3000).is_err());
/// # Ok::<(), zipmend::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    /// Payload compression method.
    pub method: CompressionMethod,
    /// Required payload alignment: 0 or a power of two up to 32768.
    pub alignment: u64,
    /// Stamp override; the archive default applies when `None`.
    pub last_modified: Option<DosDateTime>,
}

impl EntryOptions {
    /// Creates options for a DEFLATE entry with no alignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the compression method.
    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the payload alignment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAlignment`] unless `alignment` is 0 or a power
    /// of two no larger than 32768.
    pub fn alignment(mut self, alignment: u64) -> Result<Self> {
        if !is_valid_alignment(alignment) {
            return Err(Error::InvalidAlignment { alignment });
        }
        self.alignment = alignment;
        Ok(self)
    }

    /// Overrides the last-modified stamp.
    pub fn last_modified(mut self, stamp: DosDateTime) -> Self {
        self.last_modified = Some(stamp);
        self
    }
}
