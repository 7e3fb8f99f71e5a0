//! Entry preparation: hashing and encoding content before placement.
//!
//! An entry's span cannot be reserved until its payload size is known, so
//! every add goes through a [`PreparedEntry`] first: the source is read
//! once, hashed with CRC-32 and encoded into a [`Spool`]. Preparation
//! touches no archive state, which lets [`prepare_all`] encode many entries
//! concurrently while placement stays sequential.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipmend::{ArchiveOptions, EntryOptions, EntryRequest, ZipArchive, prepare_all};
//!
//! let options = ArchiveOptions::default();
//! let requests = vec![
//!     EntryRequest::bytes("a.txt", b"alpha".to_vec(), EntryOptions::new()),
//!     EntryRequest::path("lib/libfoo.so", "build/libfoo.so", EntryOptions::new()),
//! ];
//!
//! let archive = ZipArchive::open_with_options("app.zip", options.clone())?;
//! for prepared in prepare_all(requests, &options) {
//!     archive.add_prepared(prepared?)?;
//! }
//! archive.close()?;
//! # Ok::<(), zipmend::Error>(())
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::archive_path::ArchivePath;
use crate::checksum::Crc32Reader;
use crate::codec::{CompressionMethod, Spool, SpoolReader, build_encoder};
use crate::format::extra::is_valid_alignment;
use crate::options::{ArchiveOptions, EntryOptions};
use crate::read::ArchiveReader;
use crate::timestamp::DosDateTime;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Where an entry's content comes from.
pub enum EntrySource {
    /// In-memory content.
    Bytes(Vec<u8>),
    /// A file on disk, read when the entry is prepared.
    Path(PathBuf),
    /// Any other stream.
    Reader(Box<dyn Read + Send>),
}

impl std::fmt::Debug for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// A named entry waiting to be prepared.
#[derive(Debug)]
pub struct EntryRequest {
    /// Entry name.
    pub name: String,
    /// Content source.
    pub source: EntrySource,
    /// Per-entry options.
    pub options: EntryOptions,
}

impl EntryRequest {
    /// Creates a request for in-memory content.
    pub fn bytes(name: impl Into<String>, data: Vec<u8>, options: EntryOptions) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Bytes(data),
            options,
        }
    }

    /// Creates a request for a file on disk.
    pub fn path(name: impl Into<String>, path: impl Into<PathBuf>, options: EntryOptions) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Path(path.into()),
            options,
        }
    }

    /// Creates a request for an arbitrary stream.
    pub fn reader(
        name: impl Into<String>,
        reader: impl Read + Send + 'static,
        options: EntryOptions,
    ) -> Self {
        Self {
            name: name.into(),
            source: EntrySource::Reader(Box::new(reader)),
            options,
        }
    }

    /// Prepares this request.
    pub fn prepare(self, archive: &ArchiveOptions) -> Result<PreparedEntry> {
        match self.source {
            EntrySource::Bytes(data) => {
                PreparedEntry::prepare(&self.name, &mut data.as_slice(), &self.options, archive)
            }
            EntrySource::Path(path) => {
                PreparedEntry::from_path(&self.name, &path, &self.options, archive)
            }
            EntrySource::Reader(mut reader) => {
                PreparedEntry::prepare(&self.name, &mut reader, &self.options, archive)
            }
        }
    }
}

/// An entry whose payload is encoded and ready to be placed.
#[derive(Debug)]
pub struct PreparedEntry {
    name: ArchivePath,
    method: CompressionMethod,
    alignment: u64,
    crc32: u32,
    uncompressed_size: u64,
    last_modified: DosDateTime,
    payload: SpoolReader,
}

impl PreparedEntry {
    /// Hashes and encodes everything `source` yields.
    ///
    /// Directory names (ending in `/`) are always stored and must have no
    /// content.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidEntryName`] if `name` fails validation, or names a
    ///   directory but `source` is not empty
    /// - [`Error::InvalidAlignment`] for an unsupported alignment
    /// - [`Error::UnsupportedMethod`] if the method cannot be produced
    /// - [`Error::Io`] if reading the source or spooling fails
    pub fn prepare(
        name: &str,
        source: &mut dyn Read,
        options: &EntryOptions,
        archive: &ArchiveOptions,
    ) -> Result<Self> {
        let name = ArchivePath::new(name)?;
        if !is_valid_alignment(options.alignment) {
            return Err(Error::InvalidAlignment {
                alignment: options.alignment,
            });
        }
        let method = if name.is_directory() {
            CompressionMethod::Stored
        } else {
            options.method
        };

        let mut encoder = build_encoder(
            method,
            archive.deflate_level,
            Spool::new(archive.spool_threshold),
            name.as_str(),
        )?;
        let mut hashing = Crc32Reader::new(source);
        io::copy(&mut hashing, &mut encoder)?;
        let spool = encoder.finish()?;

        if name.is_directory() && hashing.bytes_read() > 0 {
            return Err(Error::InvalidEntryName(format!(
                "directory entry '{}' cannot have content",
                name
            )));
        }

        log::debug!(
            "prepared '{}': {} -> {} bytes ({})",
            name,
            hashing.bytes_read(),
            spool.len(),
            method
        );
        Ok(Self {
            crc32: hashing.crc(),
            uncompressed_size: hashing.bytes_read(),
            last_modified: options.last_modified.unwrap_or(archive.last_modified),
            alignment: options.alignment,
            method,
            name,
            payload: spool.into_reader()?,
        })
    }

    /// Prepares in-memory content.
    pub fn from_bytes(
        name: &str,
        data: &[u8],
        options: &EntryOptions,
        archive: &ArchiveOptions,
    ) -> Result<Self> {
        Self::prepare(name, &mut &data[..], options, archive)
    }

    /// Prepares the content of a file on disk.
    ///
    /// When `options` sets no stamp, the file's modification time is used.
    pub fn from_path(
        name: &str,
        path: &Path,
        options: &EntryOptions,
        archive: &ArchiveOptions,
    ) -> Result<Self> {
        let file = File::open(path)?;
        let mut options = options.clone();
        if options.last_modified.is_none() {
            if let Ok(modified) = file.metadata().and_then(|m| m.modified()) {
                options.last_modified = Some(DosDateTime::from_system_time(modified));
            }
        }
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, file);
        Self::prepare(name, &mut reader, &options, archive)
    }

    /// Takes an entry from another archive without decoding it.
    ///
    /// The payload is copied as stored, so entries with methods this crate
    /// cannot decode can still be transplanted.
    pub fn from_archive<R: Read + Seek>(
        source: &mut ArchiveReader<R>,
        name: &str,
        alignment: u64,
        archive: &ArchiveOptions,
    ) -> Result<Self> {
        if !is_valid_alignment(alignment) {
            return Err(Error::InvalidAlignment { alignment });
        }
        let mut spool = Spool::new(archive.spool_threshold);
        let entry = source.copy_raw(name, &mut spool)?;
        Ok(Self {
            name: entry.name,
            method: entry.method,
            alignment,
            crc32: entry.crc32,
            uncompressed_size: entry.uncompressed_size,
            last_modified: entry.last_modified,
            payload: spool.into_reader()?,
        })
    }

    /// Returns the same payload under another name.
    pub fn renamed(mut self, name: &str) -> Result<Self> {
        let name = ArchivePath::new(name)?;
        if name.is_directory() != self.name.is_directory() {
            return Err(Error::InvalidEntryName(format!(
                "cannot rename '{}' to '{}'",
                self.name, name
            )));
        }
        self.name = name;
        Ok(self)
    }

    /// Entry name.
    pub fn name(&self) -> &ArchivePath {
        &self.name
    }

    /// Payload compression method.
    pub fn method(&self) -> CompressionMethod {
        self.method
    }

    /// Requested payload alignment.
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// CRC-32 of the content.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Content size.
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Encoded payload size.
    pub fn compressed_size(&self) -> u64 {
        self.payload.len()
    }

    /// Last-modified stamp.
    pub fn last_modified(&self) -> DosDateTime {
        self.last_modified
    }

    pub(crate) fn payload_mut(&mut self) -> &mut SpoolReader {
        &mut self.payload
    }
}

/// Prepares many entries, concurrently when the `parallel` feature is on.
///
/// Results come back in request order. A failing request does not stop the
/// others.
#[cfg(feature = "parallel")]
pub fn prepare_all(requests: Vec<EntryRequest>, options: &ArchiveOptions) -> Vec<Result<PreparedEntry>> {
    requests
        .into_par_iter()
        .map(|request| request.prepare(options))
        .collect()
}

/// Prepares many entries one after another.
#[cfg(not(feature = "parallel"))]
pub fn prepare_all(requests: Vec<EntryRequest>, options: &ArchiveOptions) -> Vec<Result<PreparedEntry>> {
    requests
        .into_iter()
        .map(|request| request.prepare(options))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn payload(mut entry: PreparedEntry) -> Vec<u8> {
        let mut out = Vec::new();
        entry.payload_mut().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_prepare_stored() {
        let options = EntryOptions::new().method(CompressionMethod::Stored);
        let entry =
            PreparedEntry::from_bytes("a.txt", b"hello", &options, &ArchiveOptions::default())
                .unwrap();
        assert_eq!(entry.crc32(), crc32fast::hash(b"hello"));
        assert_eq!(entry.uncompressed_size(), 5);
        assert_eq!(entry.compressed_size(), 5);
        assert_eq!(payload(entry), b"hello");
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_prepare_deflate_shrinks_repetitive_content() {
        let content = vec![b'z'; 10_000];
        let entry = PreparedEntry::from_bytes(
            "z.bin",
            &content,
            &EntryOptions::new(),
            &ArchiveOptions::default(),
        )
        .unwrap();
        assert_eq!(entry.method(), CompressionMethod::Deflate);
        assert_eq!(entry.uncompressed_size(), 10_000);
        assert!(entry.compressed_size() < 200);
    }

    #[test]
    fn test_directory_forced_to_stored() {
        let entry = PreparedEntry::from_bytes(
            "assets/",
            b"",
            &EntryOptions::new(),
            &ArchiveOptions::default(),
        )
        .unwrap();
        assert_eq!(entry.method(), CompressionMethod::Stored);
        assert_eq!(entry.compressed_size(), 0);

        let err = PreparedEntry::from_bytes(
            "assets/",
            b"data",
            &EntryOptions::new(),
            &ArchiveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidEntryName(_)));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let archive = ArchiveOptions::default();
        assert!(matches!(
            PreparedEntry::from_bytes("../x", b"", &EntryOptions::new(), &archive),
            Err(Error::InvalidEntryName(_))
        ));
        let mut options = EntryOptions::new();
        options.alignment = 3;
        assert!(matches!(
            PreparedEntry::from_bytes("x", b"", &options, &archive),
            Err(Error::InvalidAlignment { alignment: 3 })
        ));
        let options = EntryOptions::new().method(CompressionMethod::Unknown(14));
        assert!(matches!(
            PreparedEntry::from_bytes("x", b"", &options, &archive),
            Err(Error::UnsupportedMethod { method: 14, .. })
        ));
    }

    #[test]
    fn test_spool_spills_large_payloads() {
        let archive = ArchiveOptions::default().spool_threshold(64);
        let options = EntryOptions::new().method(CompressionMethod::Stored);
        let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let entry = PreparedEntry::from_bytes("big", &content, &options, &archive).unwrap();
        assert_eq!(payload(entry), content);
    }

    #[test]
    fn test_last_modified_defaults_to_archive_stamp() {
        let stamp = DosDateTime::from_fields(0x6000, 0x5821);
        let archive = ArchiveOptions::default().last_modified(stamp);
        let entry = PreparedEntry::from_bytes("a", b"", &EntryOptions::new(), &archive).unwrap();
        assert_eq!(entry.last_modified(), stamp);

        let own = DosDateTime::from_fields(0, 0x5821);
        let options = EntryOptions::new().last_modified(own);
        let entry = PreparedEntry::from_bytes("a", b"", &options, &archive).unwrap();
        assert_eq!(entry.last_modified(), own);
    }

    #[test]
    fn test_prepare_all_keeps_order_and_isolates_failures() {
        let requests = vec![
            EntryRequest::bytes("one", b"1".to_vec(), EntryOptions::new()),
            EntryRequest::bytes("/bad", b"2".to_vec(), EntryOptions::new()),
            EntryRequest::reader("three", io::Cursor::new(b"333".to_vec()), EntryOptions::new()),
        ];
        let results = prepare_all(requests, &ArchiveOptions::default());
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().name().as_str(), "one");
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().uncompressed_size(), 3);
    }

    #[test]
    fn test_renamed() {
        let archive = ArchiveOptions::default();
        let entry = PreparedEntry::from_bytes("a", b"x", &EntryOptions::new(), &archive).unwrap();
        let entry = entry.renamed("b/c").unwrap();
        assert_eq!(entry.name().as_str(), "b/c");
        assert!(entry.renamed("d/").is_err());
    }
}
