//! End of central directory records.
//!
//! The trailer is everything from the start of the central directory to the
//! end of the file: directory records, the optional ZIP64 end record and
//! locator, and the EOCD with its comment. The EOCD is found by scanning
//! backward over at most `22 + 65535` bytes for a signature whose comment
//! length reaches the end of the file exactly.

use std::io::{Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{
    EOCD_LEN, EOCD_SIGNATURE, MAX_COMMENT_LEN, VERSION_ZIP64, ZIP64_EOCD_LEN,
    ZIP64_EOCD_SIGNATURE, ZIP64_LOCATOR_LEN, ZIP64_LOCATOR_SIGNATURE, ZIP64_MARKER_16,
    ZIP64_MARKER_32, truncated,
};
use crate::{Error, Result};

/// The decoded trailer of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    /// Number of central directory records.
    pub entry_count: u64,
    /// Offset of the first central directory record.
    pub directory_offset: u64,
    /// Size of the central directory in bytes.
    pub directory_size: u64,
    /// Offset of the EOCD record.
    pub eocd_offset: u64,
    /// Archive comment.
    pub comment: Vec<u8>,
    /// Whether ZIP64 end records were present.
    pub zip64: bool,
}

impl Trailer {
    /// Offset of the first trailer byte.
    pub fn start(&self) -> u64 {
        self.directory_offset
    }
}

/// Raw EOCD fields.
#[derive(Debug, Clone, Copy)]
struct EndOfCentralDirectory {
    disk_number: u16,
    disk_with_cd: u16,
    disk_entries: u16,
    total_entries: u16,
    cd_size: u32,
    cd_offset: u32,
}

impl EndOfCentralDirectory {
    fn parse(mut data: &[u8]) -> std::io::Result<Self> {
        let _signature = data.read_u32::<LittleEndian>()?;
        Ok(Self {
            disk_number: data.read_u16::<LittleEndian>()?,
            disk_with_cd: data.read_u16::<LittleEndian>()?,
            disk_entries: data.read_u16::<LittleEndian>()?,
            total_entries: data.read_u16::<LittleEndian>()?,
            cd_size: data.read_u32::<LittleEndian>()?,
            cd_offset: data.read_u32::<LittleEndian>()?,
        })
    }

    fn has_sentinels(&self) -> bool {
        self.disk_entries == ZIP64_MARKER_16
            || self.total_entries == ZIP64_MARKER_16
            || self.cd_size == ZIP64_MARKER_32
            || self.cd_offset == ZIP64_MARKER_32
    }
}

/// Finds the EOCD in the tail of the file.
///
/// Returns its offset and raw bytes including the comment.
fn find_eocd<R: Read + Seek>(reader: &mut R, file_len: u64) -> Result<(u64, Vec<u8>)> {
    if file_len < EOCD_LEN {
        return Err(Error::malformed(
            0,
            format!("file too short for an archive ({} bytes)", file_len),
        ));
    }

    let window = file_len.min(EOCD_LEN + MAX_COMMENT_LEN as u64);
    let window_start = file_len - window;
    reader.seek(SeekFrom::Start(window_start))?;
    let mut tail = vec![0u8; window as usize];
    reader
        .read_exact(&mut tail)
        .map_err(truncated(window_start, "archive tail"))?;

    let signature = EOCD_SIGNATURE.to_le_bytes();
    let eocd_len = EOCD_LEN as usize;
    for pos in (0..=tail.len() - eocd_len).rev() {
        if tail[pos..pos + 4] != signature {
            continue;
        }
        let comment_len = usize::from(u16::from_le_bytes([tail[pos + 20], tail[pos + 21]]));
        if pos + eocd_len + comment_len == tail.len() {
            let eocd_offset = window_start + pos as u64;
            return Ok((eocd_offset, tail.split_off(pos)));
        }
    }

    Err(Error::malformed(
        window_start,
        "end of central directory record not found",
    ))
}

/// Locates and decodes the trailer.
///
/// # Errors
///
/// - [`Error::MalformedArchive`] if no EOCD is found or its fields are
///   inconsistent with the file
/// - [`Error::UnsupportedFeature`] for multi-disk archives
pub fn decode_trailer<R: Read + Seek>(reader: &mut R) -> Result<Trailer> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    let (eocd_offset, raw) = find_eocd(reader, file_len)?;
    let eocd = EndOfCentralDirectory::parse(&raw)?;
    let comment = raw[EOCD_LEN as usize..].to_vec();

    if eocd.disk_number != 0 || eocd.disk_with_cd != 0 || eocd.disk_entries != eocd.total_entries
    {
        return Err(Error::UnsupportedFeature {
            feature: "multi-disk archives",
        });
    }

    let mut entry_count = u64::from(eocd.total_entries);
    let mut directory_size = u64::from(eocd.cd_size);
    let mut directory_offset = u64::from(eocd.cd_offset);
    let mut records_start = eocd_offset;
    let mut zip64 = false;

    if eocd.has_sentinels() {
        match read_zip64_records(reader, eocd_offset)? {
            Some(records) => {
                entry_count = records.total_entries;
                directory_size = records.cd_size;
                directory_offset = records.cd_offset;
                records_start = records.eocd64_offset;
                zip64 = true;
            }
            // A count of exactly 65535 is legal without ZIP64 records.
            None if eocd.cd_size != ZIP64_MARKER_32 && eocd.cd_offset != ZIP64_MARKER_32 => {}
            None => {
                return Err(Error::malformed(
                    eocd_offset,
                    "ZIP64 sentinels without ZIP64 end of central directory locator",
                ));
            }
        }
    }

    let directory_end = directory_offset.checked_add(directory_size).ok_or_else(|| {
        Error::malformed(eocd_offset, "central directory bounds overflow")
    })?;
    if directory_end > records_start {
        return Err(Error::malformed(
            eocd_offset,
            format!(
                "central directory [{:#x}, {:#x}) overlaps end records at {:#x}",
                directory_offset, directory_end, records_start
            ),
        ));
    }

    Ok(Trailer {
        entry_count,
        directory_offset,
        directory_size,
        eocd_offset,
        comment,
        zip64,
    })
}

struct Zip64Records {
    eocd64_offset: u64,
    total_entries: u64,
    cd_size: u64,
    cd_offset: u64,
}

fn read_zip64_records<R: Read + Seek>(
    reader: &mut R,
    eocd_offset: u64,
) -> Result<Option<Zip64Records>> {
    let Some(locator_offset) = eocd_offset.checked_sub(ZIP64_LOCATOR_LEN) else {
        return Ok(None);
    };

    reader.seek(SeekFrom::Start(locator_offset))?;
    let mut locator = [0u8; ZIP64_LOCATOR_LEN as usize];
    reader
        .read_exact(&mut locator)
        .map_err(truncated(locator_offset, "ZIP64 locator"))?;
    let mut c = &locator[..];
    if c.read_u32::<LittleEndian>()? != ZIP64_LOCATOR_SIGNATURE {
        return Ok(None);
    }
    let disk_with_eocd64 = c.read_u32::<LittleEndian>()?;
    let eocd64_offset = c.read_u64::<LittleEndian>()?;
    let total_disks = c.read_u32::<LittleEndian>()?;
    if disk_with_eocd64 != 0 || total_disks > 1 {
        return Err(Error::UnsupportedFeature {
            feature: "multi-disk archives",
        });
    }
    if eocd64_offset.saturating_add(ZIP64_EOCD_LEN) > locator_offset {
        return Err(Error::malformed(
            locator_offset,
            "ZIP64 end of central directory offset out of range",
        ));
    }

    reader.seek(SeekFrom::Start(eocd64_offset))?;
    let mut record = [0u8; ZIP64_EOCD_LEN as usize];
    reader
        .read_exact(&mut record)
        .map_err(truncated(eocd64_offset, "ZIP64 end of central directory"))?;
    let mut c = &record[..];
    if c.read_u32::<LittleEndian>()? != ZIP64_EOCD_SIGNATURE {
        return Err(Error::malformed(
            eocd64_offset,
            "bad ZIP64 end of central directory signature",
        ));
    }
    let _record_size = c.read_u64::<LittleEndian>()?;
    let _version_made_by = c.read_u16::<LittleEndian>()?;
    let _version_needed = c.read_u16::<LittleEndian>()?;
    let disk_number = c.read_u32::<LittleEndian>()?;
    let disk_with_cd = c.read_u32::<LittleEndian>()?;
    let disk_entries = c.read_u64::<LittleEndian>()?;
    let total_entries = c.read_u64::<LittleEndian>()?;
    let cd_size = c.read_u64::<LittleEndian>()?;
    let cd_offset = c.read_u64::<LittleEndian>()?;

    if disk_number != 0 || disk_with_cd != 0 || disk_entries != total_entries {
        return Err(Error::UnsupportedFeature {
            feature: "multi-disk archives",
        });
    }

    Ok(Some(Zip64Records {
        eocd64_offset,
        total_entries,
        cd_size,
        cd_offset,
    }))
}

/// Encodes the end records that follow a central directory.
///
/// ZIP64 records are emitted only when a count, size or offset overflows its
/// classic field. Callers check the comment length first; anything past
/// 65535 bytes is dropped.
pub fn encode_trailer(
    entry_count: u64,
    directory_offset: u64,
    directory_size: u64,
    comment: &[u8],
) -> Vec<u8> {
    let comment = &comment[..comment.len().min(MAX_COMMENT_LEN)];
    let zip64 = entry_count >= u64::from(ZIP64_MARKER_16)
        || directory_size >= u64::from(ZIP64_MARKER_32)
        || directory_offset >= u64::from(ZIP64_MARKER_32);

    let mut out = Vec::with_capacity(
        (ZIP64_EOCD_LEN + ZIP64_LOCATOR_LEN + EOCD_LEN) as usize + comment.len(),
    );
    // Writes into a Vec cannot fail.
    let _ = write_end_records(
        &mut out,
        zip64,
        entry_count,
        directory_offset,
        directory_size,
        comment,
    );
    out
}

fn write_end_records(
    out: &mut Vec<u8>,
    zip64: bool,
    entry_count: u64,
    directory_offset: u64,
    directory_size: u64,
    comment: &[u8],
) -> std::io::Result<()> {
    if zip64 {
        let eocd64_offset = directory_offset + directory_size;
        out.write_u32::<LittleEndian>(ZIP64_EOCD_SIGNATURE)?;
        out.write_u64::<LittleEndian>(ZIP64_EOCD_LEN - 12)?;
        out.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        out.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u64::<LittleEndian>(entry_count)?;
        out.write_u64::<LittleEndian>(entry_count)?;
        out.write_u64::<LittleEndian>(directory_size)?;
        out.write_u64::<LittleEndian>(directory_offset)?;

        out.write_u32::<LittleEndian>(ZIP64_LOCATOR_SIGNATURE)?;
        out.write_u32::<LittleEndian>(0)?;
        out.write_u64::<LittleEndian>(eocd64_offset)?;
        out.write_u32::<LittleEndian>(1)?;
    }

    let count = if zip64 {
        ZIP64_MARKER_16
    } else {
        entry_count as u16
    };
    let size = if zip64 {
        ZIP64_MARKER_32
    } else {
        directory_size as u32
    };
    let offset = if zip64 {
        ZIP64_MARKER_32
    } else {
        directory_offset as u32
    };

    out.write_u32::<LittleEndian>(EOCD_SIGNATURE)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(count)?;
    out.write_u16::<LittleEndian>(count)?;
    out.write_u32::<LittleEndian>(size)?;
    out.write_u32::<LittleEndian>(offset)?;
    out.write_u16::<LittleEndian>(comment.len() as u16)?;
    out.extend_from_slice(comment);
    Ok(())
}
