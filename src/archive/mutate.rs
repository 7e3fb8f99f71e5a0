//! Staged mutations.
//!
//! An add plans its placement on a copy of the allocator, writes the header
//! and payload, and only then swaps the copy in and updates the index. A
//! failed write leaves the entries and free regions exactly as they were.

use std::io::{self, BufWriter, Seek, SeekFrom, Write};

use super::Session;
use crate::format::LocalFileHeader;
use crate::format::extra::alignment_field;
use crate::index::{CentralMetadata, Entry};
use crate::prepare::PreparedEntry;
use crate::{Error, READ_BUFFER_SIZE, Result};

impl Session {
    /// Releases the on-disk trailer into `free` if it is still there.
    fn reclaim_trailer_into(&self, free: &mut crate::free_space::FreeSpaceAllocator) {
        if let Some(trailer) = self.trailer {
            free.reclaim_trailer(trailer.offset, trailer.length);
        }
    }

    pub(super) fn add(&mut self, mut prepared: PreparedEntry, sync: bool) -> Result<Entry> {
        let name = prepared.name().clone();
        let method = prepared.method();
        let alignment = prepared.alignment();
        let compressed_size = prepared.compressed_size();
        let mut central = CentralMetadata::for_new_entry(&name, method);

        let mut header = LocalFileHeader::new(
            central.version_needed,
            central.flags,
            method.id(),
            prepared.last_modified(),
            prepared.crc32(),
            compressed_size,
            prepared.uncompressed_size(),
            name.as_bytes(),
            &[],
        );
        central.version_needed = header.version_needed;

        let mut free = self.free.clone();
        self.reclaim_trailer_into(&mut free);
        if let Some(old) = self.index.get(name.as_str()) {
            free.release(old.offset, old.span);
        }
        let reservation = free.reserve_entry(header.encoded_len(), compressed_size, alignment);
        header
            .extra
            .extend_from_slice(&alignment_field(reservation.padding, alignment));
        debug_assert_eq!(
            header.encoded_len() + compressed_size,
            reservation.length
        );

        if let Err(err) = self.write_entry(&header, &mut prepared, reservation.offset, sync) {
            // The old directory may have been partly overwritten.
            self.dirty = true;
            return Err(err);
        }

        let entry = Entry {
            name,
            method,
            crc32: prepared.crc32(),
            compressed_size,
            uncompressed_size: prepared.uncompressed_size(),
            last_modified: prepared.last_modified(),
            alignment,
            offset: reservation.offset,
            span: reservation.length,
            payload_offset: reservation.offset + header.encoded_len(),
            central,
        };

        self.free = free;
        self.trailer = None;
        self.dirty = true;
        if let Some(old) = self.index.put(entry.clone()) {
            log::debug!(
                "replaced '{}': {:#x}+{} -> {:#x}+{}",
                entry.name,
                old.offset,
                old.span,
                entry.offset,
                entry.span
            );
        } else {
            log::debug!("added '{}' at {:#x}+{}", entry.name, entry.offset, entry.span);
        }
        Ok(entry)
    }

    fn write_entry(
        &mut self,
        header: &LocalFileHeader,
        prepared: &mut PreparedEntry,
        offset: u64,
        sync: bool,
    ) -> Result<()> {
        let expected = prepared.compressed_size();
        let payload = prepared.payload_mut();
        payload.rewind()?;

        self.file.seek(SeekFrom::Start(offset))?;
        let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, &mut self.file);
        header.write_to(&mut writer)?;
        let copied = io::copy(payload, &mut writer)?;
        writer.flush()?;
        drop(writer);

        if copied != expected {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload spool yielded {} of {} bytes", copied, expected),
            )));
        }
        if sync {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub(super) fn delete(&mut self, name: &str) -> Result<()> {
        let entry = self
            .index
            .remove(name)
            .ok_or_else(|| Error::not_found(name))?;

        let mut free = self.free.clone();
        self.reclaim_trailer_into(&mut free);
        free.release(entry.offset, entry.span);

        self.free = free;
        self.trailer = None;
        self.dirty = true;
        log::debug!("deleted '{}' at {:#x}+{}", entry.name, entry.offset, entry.span);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ArchiveOptions;
    use crate::archive::ZipArchive;
    use crate::codec::CompressionMethod;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> ZipArchive {
        let options = ArchiveOptions::default().sync_on_commit(false);
        ZipArchive::open_with_options(dir.path().join("m.zip"), options).unwrap()
    }

    #[test]
    fn test_replace_reuses_own_span() {
        let dir = TempDir::new().unwrap();
        let archive = open(&dir);
        archive
            .add_bytes("a", b"0123456789", CompressionMethod::Stored, 0)
            .unwrap();
        archive
            .add_bytes("b", b"tail", CompressionMethod::Stored, 0)
            .unwrap();
        let replaced = archive
            .add_bytes("a", b"012345", CompressionMethod::Stored, 0)
            .unwrap();
        assert_eq!(replaced.offset, 0);
        let layout = archive.layout().unwrap();
        layout.verify_tiling().unwrap();
        assert_eq!(layout.free_bytes(), 4);
    }

    #[test]
    fn test_delete_last_entry_shrinks() {
        let dir = TempDir::new().unwrap();
        let archive = open(&dir);
        archive
            .add_bytes("a", b"first", CompressionMethod::Stored, 0)
            .unwrap();
        let b = archive
            .add_bytes("b", b"second", CompressionMethod::Stored, 0)
            .unwrap();
        archive.delete("b").unwrap();
        let layout = archive.layout().unwrap();
        assert_eq!(layout.file_length, b.offset);
        assert_eq!(layout.free_bytes(), 0);
    }

    #[test]
    fn test_failed_write_leaves_session_untouched() {
        use crate::archive::Session;
        use crate::options::EntryOptions;
        use crate::prepare::PreparedEntry;
        use crate::read::ArchiveReader;
        use std::fs::File;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("m.zip");
        let options = ArchiveOptions::default().sync_on_commit(false);
        let archive = open(&dir);
        archive
            .add_bytes("a", b"alpha", CompressionMethod::Stored, 0)
            .unwrap();
        archive
            .add_bytes("b", b"beta", CompressionMethod::Stored, 0)
            .unwrap();
        archive.close().unwrap();

        let mut session = Session::open(&path, &options).unwrap();
        assert!(!session.dirty);
        let free_before = session.free.clone();
        let spans_before: Vec<_> = session.index.spans().collect();
        let trailer_before = session.trailer;

        let writable = std::mem::replace(&mut session.file, File::open(&path).unwrap());
        let stored = EntryOptions::new().method(CompressionMethod::Stored);
        for name in ["c", "a"] {
            let prepared =
                PreparedEntry::from_bytes(name, &[9u8; 64], &stored, &options).unwrap();
            assert!(session.add(prepared, false).is_err());
        }

        assert!(session.dirty);
        assert_eq!(session.free, free_before);
        assert_eq!(session.index.spans().collect::<Vec<_>>(), spans_before);
        assert!(!session.index.contains("c"));
        assert_eq!(session.trailer, trailer_before);

        session.file = writable;
        session.commit(&options).unwrap();
        assert!(!session.dirty);
        drop(session);

        let mut reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.len(), 2);
        assert_eq!(reader.read("a").unwrap(), b"alpha");
        assert_eq!(reader.read("b").unwrap(), b"beta");
    }

    #[test]
    fn test_sync_on_commit_entry_write() {
        let dir = TempDir::new().unwrap();
        let options = ArchiveOptions::default().sync_on_commit(true);
        let archive = ZipArchive::open_with_options(dir.path().join("s.zip"), options).unwrap();
        archive
            .add_bytes("synced", b"durable", CompressionMethod::Stored, 0)
            .unwrap();
        assert_eq!(archive.read("synced").unwrap(), b"durable");
        archive.close().unwrap();
    }

    #[test]
    fn test_aligned_payload() {
        let dir = TempDir::new().unwrap();
        let archive = open(&dir);
        archive
            .add_bytes("x.txt", b"x", CompressionMethod::Stored, 0)
            .unwrap();
        let entry = archive
            .add_bytes("lib/libx.so", &[7u8; 100], CompressionMethod::Stored, 4096)
            .unwrap();
        assert_eq!(entry.payload_offset % 4096, 0);
        assert_eq!(entry.alignment, 4096);
        assert_eq!(archive.read("lib/libx.so").unwrap(), vec![7u8; 100]);
    }
}
