//! Writing the central directory and trailer.

use std::io::{BufWriter, Seek, SeekFrom, Write};

use super::{Session, TrailerSpan};
use crate::format::extra::write_filler;
use crate::format::{LOCAL_HEADER_LEN, LocalFileHeader, encode_trailer};
use crate::free_space::FreeRegion;
use crate::options::ArchiveOptions;
use crate::timestamp::DosDateTime;
use crate::{READ_BUFFER_SIZE, Result};

/// Largest region a single filler record can cover.
const MAX_FILLER_LEN: u64 = LOCAL_HEADER_LEN + u16::MAX as u64;

/// Splits a gap into filler record lengths.
///
/// Every chunk is at least a local header long, except a final remainder
/// below that size, which is zero filled.
fn filler_chunks(mut length: u64) -> Vec<u64> {
    let mut chunks = Vec::new();
    while length >= LOCAL_HEADER_LEN {
        let mut chunk = length.min(MAX_FILLER_LEN);
        let rest = length - chunk;
        if rest > 0 && rest < LOCAL_HEADER_LEN {
            chunk = length - LOCAL_HEADER_LEN;
        }
        chunks.push(chunk);
        length -= chunk;
    }
    if length > 0 {
        chunks.push(length);
    }
    chunks
}

impl Session {
    /// Writes a new directory at the end of data if anything changed.
    pub(super) fn commit(&mut self, options: &ArchiveOptions) -> Result<()> {
        if !self.dirty {
            log::trace!("nothing to commit");
            return Ok(());
        }

        let mut free = self.free.clone();
        if let Some(trailer) = self.trailer {
            free.reclaim_trailer(trailer.offset, trailer.length);
        }

        let mut directory = Vec::new();
        for entry in self.index.entries_in_disk_order() {
            entry.to_central_record().write_to(&mut directory)?;
        }
        let directory_offset = free.end_of_data();
        let trailer = encode_trailer(
            self.index.len() as u64,
            directory_offset,
            directory.len() as u64,
            &self.comment,
        );
        let length = (directory.len() + trailer.len()) as u64;
        let offset = free.reserve_tail(length);
        debug_assert_eq!(offset, directory_offset);

        if options.fill_gaps {
            self.write_fillers(free.regions())?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        {
            let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, &mut self.file);
            writer.write_all(&directory)?;
            writer.write_all(&trailer)?;
            writer.flush()?;
        }
        self.file.set_len(free.end_of_data())?;
        if options.sync_on_commit {
            self.file.sync_all()?;
        }

        log::debug!(
            "committed {} entries, directory at {:#x}+{}, file length {}",
            self.index.len(),
            offset,
            length,
            free.end_of_data()
        );
        self.free = free;
        self.trailer = Some(TrailerSpan { offset, length });
        self.dirty = false;
        Ok(())
    }

    /// Covers free regions with nameless local headers.
    ///
    /// A reader walking local headers front to back steps over each filler
    /// by its extra field length. Fillers are absent from the directory, so
    /// the bytes stay free.
    fn write_fillers(&mut self, regions: &[FreeRegion]) -> Result<()> {
        for region in regions {
            self.file.seek(SeekFrom::Start(region.offset))?;
            let mut writer = BufWriter::with_capacity(READ_BUFFER_SIZE, &mut self.file);
            for chunk in filler_chunks(region.length) {
                if chunk < LOCAL_HEADER_LEN {
                    writer.write_all(&vec![0u8; chunk as usize])?;
                    continue;
                }
                let mut extra = Vec::with_capacity((chunk - LOCAL_HEADER_LEN) as usize);
                write_filler(&mut extra, (chunk - LOCAL_HEADER_LEN) as usize)?;
                LocalFileHeader::new(10, 0, 0, DosDateTime::EPOCH, 0, 0, 0, &[], &extra)
                    .write_to(&mut writer)?;
            }
            writer.flush()?;
            log::trace!("filled gap {:#x}+{}", region.offset, region.length);
        }
        Ok(())
    }
}
