//! Read-only access to archives.
//!
//! [`ArchiveReader`] lists and decodes the entries of any `Read + Seek`
//! source. It shares directory loading with [`ZipArchive`](crate::ZipArchive)
//! but holds no allocator and cannot mutate anything, which makes it the
//! right tool for inspecting an archive stored inside another one.
//!
//! # Example
//!
//! ```rust,no_run
//! use zipmend::ArchiveReader;
//!
//! let mut reader = ArchiveReader::open("app.apk")?;
//! for entry in reader.entries() {
//!     println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//! }
//! let manifest = reader.read("AndroidManifest.xml")?;
//! # Ok::<(), zipmend::Error>(())
//! ```

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::archive::ZipArchive;
use crate::checksum::Crc32Writer;
use crate::codec::build_decoder;
use crate::format::extra::{self, ZIP64_EXTRA_ID};
use crate::format::{
    DataDescriptor, FLAG_DATA_DESCRIPTOR, LocalFileHeader, Trailer, decode_central_directory,
    decode_trailer, needs_zip64,
};
use crate::index::Entry;
use crate::{Error, READ_BUFFER_SIZE, Result};

/// Loads and validates the directory of an archive.
///
/// Each entry's span is measured from its local header. Entries are
/// returned sorted by offset. Overlapping spans, sizes that overflow or run
/// into the central directory, and duplicate names are rejected.
pub(crate) fn load_directory<R: Read + Seek>(reader: &mut R) -> Result<(Trailer, Vec<Entry>)> {
    let trailer = decode_trailer(reader)?;
    let records = decode_central_directory(reader, &trailer)?;

    let mut names = HashSet::with_capacity(records.len());
    let mut entries = Vec::with_capacity(records.len());
    for record in records {
        let offset = record.local_header_offset;
        if offset >= trailer.directory_offset {
            return Err(Error::malformed(
                offset,
                "local header offset inside the central directory",
            ));
        }

        reader.seek(SeekFrom::Start(offset))?;
        let local = LocalFileHeader::decode(reader, offset)?;
        let header_len = local.encoded_len();

        let payload_end = (offset + header_len)
            .checked_add(record.compressed_size)
            .ok_or_else(|| Error::malformed(offset, "entry size overflows"))?;
        if payload_end > trailer.directory_offset {
            return Err(Error::malformed(
                offset,
                format!(
                    "entry '{}' runs into the central directory",
                    String::from_utf8_lossy(&record.name)
                ),
            ));
        }

        let descriptor_len = if record.flags & FLAG_DATA_DESCRIPTOR != 0 {
            let at = payload_end;
            let zip64 = extra::find(&local.extra, ZIP64_EXTRA_ID).is_some()
                || needs_zip64(record.compressed_size)
                || needs_zip64(record.uncompressed_size);
            reader.seek(SeekFrom::Start(at))?;
            DataDescriptor::decode(reader, at, zip64, record.crc32)?.encoded_len()
        } else {
            0
        };

        if payload_end + descriptor_len > trailer.directory_offset {
            return Err(Error::malformed(
                offset,
                format!(
                    "data descriptor of '{}' runs into the central directory",
                    String::from_utf8_lossy(&record.name)
                ),
            ));
        }

        let alignment = extra::read_alignment(&local.extra).unwrap_or(0);
        let entry = Entry::from_central_record(record, header_len, descriptor_len, alignment);
        if !names.insert(entry.name.clone()) {
            return Err(Error::malformed(
                offset,
                format!("duplicate entry name '{}'", entry.name),
            ));
        }
        entries.push(entry);
    }

    entries.sort_by_key(|e| e.offset);
    for pair in entries.windows(2) {
        if pair[0].end() > pair[1].offset {
            return Err(Error::malformed(
                pair[1].offset,
                format!(
                    "entry '{}' overlaps entry '{}'",
                    pair[0].name, pair[1].name
                ),
            ));
        }
    }

    Ok((trailer, entries))
}

/// Decodes an entry's payload into `out`, verifying size and CRC-32.
///
/// Returns the number of content bytes written.
pub(crate) fn decode_payload<R: Read + Seek, W: Write>(
    reader: &mut R,
    entry: &Entry,
    out: &mut W,
) -> Result<u64> {
    reader.seek(SeekFrom::Start(entry.payload_offset))?;
    let bounded = BufReader::with_capacity(
        READ_BUFFER_SIZE,
        reader.by_ref().take(entry.compressed_size),
    );
    let mut decoder = build_decoder(entry.method, bounded, entry.name.as_str())?;
    let mut writer = Crc32Writer::new(out);
    io::copy(&mut decoder, &mut writer)?;

    let actual = writer.crc();
    if actual != entry.crc32 {
        return Err(Error::CrcMismatch {
            path: entry.name.to_string(),
            expected: entry.crc32,
            actual,
        });
    }
    if writer.bytes_written() != entry.uncompressed_size {
        return Err(Error::malformed(
            entry.payload_offset,
            format!(
                "entry '{}' decoded to {} bytes, expected {}",
                entry.name,
                writer.bytes_written(),
                entry.uncompressed_size
            ),
        ));
    }
    Ok(writer.bytes_written())
}

/// Copies an entry's payload bytes, still encoded, into `out`.
pub(crate) fn copy_raw_payload<R: Read + Seek, W: Write>(
    reader: &mut R,
    entry: &Entry,
    out: &mut W,
) -> Result<u64> {
    reader.seek(SeekFrom::Start(entry.payload_offset))?;
    let copied = io::copy(&mut reader.by_ref().take(entry.compressed_size), out)?;
    if copied != entry.compressed_size {
        return Err(Error::malformed(
            entry.payload_offset,
            format!("payload of '{}' is truncated", entry.name),
        ));
    }
    Ok(copied)
}

/// Read-only view of an archive.
pub struct ArchiveReader<R> {
    reader: R,
    trailer: Trailer,
    entries: Vec<Entry>,
    by_name: HashMap<String, usize>,
}

impl<R> std::fmt::Debug for ArchiveReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("entries", &self.entries.len())
            .field("directory_offset", &self.trailer.directory_offset)
            .finish_non_exhaustive()
    }
}

impl ArchiveReader<BufReader<File>> {
    /// Opens an archive file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Reads the directory of the archive held by `reader`.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::MalformedArchive`] or [`Error::UnsupportedFeature`]
    /// under the same rules as [`ZipArchive::open`].
    pub fn new(mut reader: R) -> Result<Self> {
        let (trailer, entries) = load_directory(&mut reader)?;
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.name.as_str().to_string(), idx))
            .collect();
        Ok(Self {
            reader,
            trailer,
            entries,
            by_name,
        })
    }

    /// Entries in on-disk order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by name.
    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    /// Archive comment.
    pub fn comment(&self) -> &[u8] {
        &self.trailer.comment
    }

    /// The decoded trailer.
    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    fn lookup(&self, name: &str) -> Result<Entry> {
        self.entry(name).cloned().ok_or_else(|| Error::not_found(name))
    }

    /// Decodes an entry into memory.
    ///
    /// # Errors
    ///
    /// - [`Error::EntryNotFound`] if no entry has this name
    /// - [`Error::UnsupportedMethod`] for methods other than STORE and DEFLATE
    /// - [`Error::CrcMismatch`] if the decoded content is damaged
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self.lookup(name)?;
        let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 24) as usize);
        decode_payload(&mut self.reader, &entry, &mut out)?;
        Ok(out)
    }

    /// Decodes an entry into `out`, returning the number of bytes written.
    pub fn read_to<W: Write>(&mut self, name: &str, out: &mut W) -> Result<u64> {
        let entry = self.lookup(name)?;
        decode_payload(&mut self.reader, &entry, out)
    }

    /// Copies an entry's encoded payload into `out` without decoding it.
    pub fn copy_raw<W: Write>(&mut self, name: &str, out: &mut W) -> Result<Entry> {
        let entry = self.lookup(name)?;
        copy_raw_payload(&mut self.reader, &entry, out)?;
        Ok(entry)
    }

    /// Opens a stored entry as an archive of its own.
    ///
    /// Deflated entries are decoded into memory first.
    pub fn nested(&mut self, name: &str) -> Result<ArchiveReader<io::Cursor<Vec<u8>>>> {
        let data = self.read(name)?;
        ArchiveReader::new(io::Cursor::new(data))
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// A read-only byte range of a [`ZipArchive`]'s file.
///
/// The view borrows the archive handle: each read takes the handle's lock
/// for the duration of the read. Mutating the parent while a view is alive
/// is allowed but the view then sees the new bytes.
pub struct EntryView<'a> {
    archive: &'a ZipArchive,
    start: u64,
    len: u64,
    pos: u64,
}

impl<'a> EntryView<'a> {
    pub(crate) fn new(archive: &'a ZipArchive, start: u64, len: u64) -> Self {
        Self {
            archive,
            start,
            len,
            pos: 0,
        }
    }

    /// Length of the viewed range.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the range is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for EntryView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryView")
            .field("start", &self.start)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl Read for EntryView<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len.saturating_sub(self.pos);
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = (remaining.min(buf.len() as u64)) as usize;
        let n = self.archive.read_at(self.start + self.pos, &mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for EntryView<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(target) => {
                self.pos = target;
                Ok(target)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of entry",
            )),
        }
    }
}

/// Backing source of a nested archive opened from a [`ZipArchive`].
#[derive(Debug)]
pub enum NestedSource<'a> {
    /// A stored entry read in place from the parent file.
    Borrowed(EntryView<'a>),
    /// A deflated entry decoded into memory.
    Inflated(io::Cursor<Vec<u8>>),
}

impl Read for NestedSource<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Borrowed(view) => view.read(buf),
            Self::Inflated(cursor) => cursor.read(buf),
        }
    }
}

impl Seek for NestedSource<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            Self::Borrowed(view) => view.seek(pos),
            Self::Inflated(cursor) => cursor.seek(pos),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CentralDirectoryRecord, encode_trailer};
    use crate::timestamp::DosDateTime;
    use std::io::Cursor;

    /// Builds a stored-only archive by hand.
    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut data = Vec::new();
        let mut directory = Vec::new();
        for (name, content) in entries {
            let offset = data.len() as u64;
            let crc = crc32fast::hash(content);
            let size = content.len() as u64;
            let local = LocalFileHeader::new(
                10,
                0,
                0,
                DosDateTime::EPOCH,
                crc,
                size,
                size,
                name.as_bytes(),
                &[],
            );
            local.write_to(&mut data).unwrap();
            data.extend_from_slice(content);
            CentralDirectoryRecord {
                version_made_by: 20,
                version_needed: 10,
                flags: 0,
                method: 0,
                last_modified: DosDateTime::EPOCH,
                crc32: crc,
                compressed_size: size,
                uncompressed_size: size,
                disk_start: 0,
                internal_attributes: 0,
                external_attributes: 0,
                local_header_offset: offset,
                name: name.as_bytes().to_vec(),
                extra: Vec::new(),
                comment: Vec::new(),
            }
            .write_to(&mut directory)
            .unwrap();
        }
        let directory_offset = data.len() as u64;
        data.extend_from_slice(&directory);
        data.extend_from_slice(&encode_trailer(
            entries.len() as u64,
            directory_offset,
            directory.len() as u64,
            b"",
        ));
        data
    }

    #[test]
    fn test_reader_lists_and_reads() {
        let bytes = build(&[("a.txt", b"hello" as &[u8]), ("b/c.txt", b"world!")]);
        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.len(), 2);
        let a = reader.entry("a.txt").unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(a.span, 30 + 5 + 5);
        assert_eq!(reader.read("b/c.txt").unwrap(), b"world!");
        assert!(matches!(
            reader.read("missing"),
            Err(Error::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_crc_mismatch_detected() {
        let mut bytes = build(&[("a.txt", b"hello")]);
        bytes[35] = b'j';
        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.read("a.txt"),
            Err(Error::CrcMismatch { .. })
        ));
    }

    #[test]
    fn test_nested_archive() {
        let inner = build(&[("inner.txt", b"nested content")]);
        let outer = build(&[("lib.zip", &inner[..])]);
        let mut reader = ArchiveReader::new(Cursor::new(outer)).unwrap();
        let mut nested = reader.nested("lib.zip").unwrap();
        assert_eq!(nested.read("inner.txt").unwrap(), b"nested content");
    }

    #[test]
    fn test_copy_raw() {
        let bytes = build(&[("x", b"raw bytes")]);
        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        let entry = reader.copy_raw("x", &mut out).unwrap();
        assert_eq!(out, b"raw bytes");
        assert_eq!(entry.compressed_size, 9);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let bytes = build(&[("same", b"1"), ("same", b"2")]);
        let err = ArchiveReader::new(Cursor::new(bytes)).unwrap_err();
        assert!(err.is_corruption());
    }
}
