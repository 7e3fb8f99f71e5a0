//! The entry index: what the archive currently contains.
//!
//! [`EntryIndex`] maps names to [`Entry`] metadata and keeps a second map
//! from local header offset to name, so the central directory can be
//! emitted in on-disk order without sorting on every commit.

use std::collections::{BTreeMap, HashMap};

use crate::archive_path::ArchivePath;
use crate::codec::CompressionMethod;
use crate::format::{
    CentralDirectoryRecord, DOS_DIRECTORY_ATTRIBUTE, FLAG_DATA_DESCRIPTOR, FLAG_UTF8,
    VERSION_MADE_BY,
};
use crate::timestamp::DosDateTime;

/// Central directory fields that the engine carries without interpreting.
///
/// Entries read from an existing archive keep these exactly as stored, so
/// re-committing an archive written by another tool does not drop metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CentralMetadata {
    pub(crate) version_made_by: u16,
    pub(crate) version_needed: u16,
    pub(crate) flags: u16,
    pub(crate) internal_attributes: u16,
    pub(crate) external_attributes: u32,
    /// Name bytes as stored, which may not be UTF-8 for foreign archives.
    pub(crate) raw_name: Vec<u8>,
    pub(crate) extra: Vec<u8>,
    pub(crate) comment: Vec<u8>,
}

impl CentralMetadata {
    /// Metadata for an entry written by this crate.
    pub(crate) fn for_new_entry(name: &ArchivePath, method: CompressionMethod) -> Self {
        let flags = if name.needs_utf8_flag() { FLAG_UTF8 } else { 0 };
        let external_attributes = if name.is_directory() {
            DOS_DIRECTORY_ATTRIBUTE
        } else {
            0
        };
        Self {
            version_made_by: VERSION_MADE_BY,
            version_needed: method.version_needed(),
            flags,
            internal_attributes: 0,
            external_attributes,
            raw_name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
        }
    }
}

/// One entry of the archive and its on-disk location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Entry name.
    pub name: ArchivePath,
    /// Payload compression method.
    pub method: CompressionMethod,
    /// CRC-32 of the uncompressed content.
    pub crc32: u32,
    /// Payload size on disk.
    pub compressed_size: u64,
    /// Content size.
    pub uncompressed_size: u64,
    /// Last modification stamp.
    pub last_modified: DosDateTime,
    /// Payload alignment the entry was written with (0 if none).
    pub alignment: u64,
    /// Offset of the local header.
    pub offset: u64,
    /// Total on-disk span: local header, payload and data descriptor.
    pub span: u64,
    /// Offset of the first payload byte.
    pub payload_offset: u64,
    pub(crate) central: CentralMetadata,
}

impl Entry {
    /// One past the last byte of the entry's span.
    pub fn end(&self) -> u64 {
        self.offset + self.span
    }

    /// Returns `true` for directory entries.
    pub fn is_directory(&self) -> bool {
        self.name.is_directory()
    }

    /// General purpose flags as recorded in the central directory.
    pub fn flags(&self) -> u16 {
        self.central.flags
    }

    /// Returns `true` if the payload is followed by a data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.central.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Per-entry comment from the central directory.
    pub fn comment(&self) -> &[u8] {
        &self.central.comment
    }

    /// Central directory extra field, without any ZIP64 block.
    pub fn central_extra(&self) -> &[u8] {
        &self.central.extra
    }

    /// "Version made by" field.
    pub fn version_made_by(&self) -> u16 {
        self.central.version_made_by
    }

    /// External file attributes.
    pub fn external_attributes(&self) -> u32 {
        self.central.external_attributes
    }

    /// Builds the central directory record describing this entry.
    pub fn to_central_record(&self) -> CentralDirectoryRecord {
        CentralDirectoryRecord {
            version_made_by: self.central.version_made_by,
            version_needed: self.central.version_needed,
            flags: self.central.flags,
            method: self.method.id(),
            last_modified: self.last_modified,
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            disk_start: 0,
            internal_attributes: self.central.internal_attributes,
            external_attributes: self.central.external_attributes,
            local_header_offset: self.offset,
            name: self.central.raw_name.clone(),
            extra: self.central.extra.clone(),
            comment: self.central.comment.clone(),
        }
    }

    /// Builds an entry from a decoded central record.
    ///
    /// `header_len` is the full length of the entry's local header and
    /// `descriptor_len` the length of the trailing data descriptor, if any.
    pub(crate) fn from_central_record(
        record: CentralDirectoryRecord,
        header_len: u64,
        descriptor_len: u64,
        alignment: u64,
    ) -> Self {
        let name = ArchivePath::from_stored(String::from_utf8_lossy(&record.name).into_owned());
        Self {
            name,
            method: CompressionMethod::from_id(record.method),
            crc32: record.crc32,
            compressed_size: record.compressed_size,
            uncompressed_size: record.uncompressed_size,
            last_modified: record.last_modified,
            alignment,
            offset: record.local_header_offset,
            span: header_len + record.compressed_size + descriptor_len,
            payload_offset: record.local_header_offset + header_len,
            central: CentralMetadata {
                version_made_by: record.version_made_by,
                version_needed: record.version_needed,
                flags: record.flags,
                internal_attributes: record.internal_attributes,
                external_attributes: record.external_attributes,
                raw_name: record.name,
                extra: record.extra,
                comment: record.comment,
            },
        }
    }
}

/// Name-to-entry map with an on-disk ordering.
#[derive(Debug, Clone, Default)]
pub struct EntryIndex {
    by_name: HashMap<ArchivePath, Entry>,
    by_offset: BTreeMap<u64, ArchivePath>,
}

impl EntryIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Looks up an entry by name.
    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.by_name.get(name)
    }

    /// Returns `true` if an entry named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Inserts an entry, returning the one it replaced.
    ///
    /// Releasing the replaced entry's span is the caller's job.
    pub fn put(&mut self, entry: Entry) -> Option<Entry> {
        let previous = self.by_name.remove(entry.name.as_str());
        if let Some(old) = &previous {
            self.by_offset.remove(&old.offset);
        }
        let displaced = self.by_offset.insert(entry.offset, entry.name.clone());
        debug_assert!(displaced.is_none(), "two entries at offset {:#x}", entry.offset);
        self.by_name.insert(entry.name.clone(), entry);
        previous
    }

    /// Removes an entry by name.
    pub fn remove(&mut self, name: &str) -> Option<Entry> {
        let entry = self.by_name.remove(name)?;
        self.by_offset.remove(&entry.offset);
        Some(entry)
    }

    /// Entries ordered by local header offset.
    ///
    /// The iterator borrows the index and can be cloned to restart it.
    pub fn entries_in_disk_order(&self) -> DiskOrder<'_> {
        DiskOrder {
            offsets: self.by_offset.values(),
            by_name: &self.by_name,
        }
    }

    /// Entry spans as `(offset, length)` in disk order.
    pub fn spans(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.entries_in_disk_order().map(|e| (e.offset, e.span))
    }
}

/// Iterator over entries in on-disk order.
#[derive(Clone)]
pub struct DiskOrder<'a> {
    offsets: std::collections::btree_map::Values<'a, u64, ArchivePath>,
    by_name: &'a HashMap<ArchivePath, Entry>,
}

impl<'a> Iterator for DiskOrder<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let name = self.offsets.next()?;
        self.by_name.get(name)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.offsets.size_hint()
    }
}

impl ExactSizeIterator for DiskOrder<'_> {}
