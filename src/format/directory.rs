//! Central directory decoding.

use std::io::{Cursor, Read, Seek, SeekFrom};

use super::records::CentralDirectoryRecord;
use super::trailer::Trailer;
use super::{CENTRAL_HEADER_LEN, FLAG_ENCRYPTED, FLAG_STRONG_ENCRYPTION, truncated};
use crate::{Error, Result};

/// Decodes every central directory record described by `trailer`.
///
/// Records are returned in directory order.
///
/// # Errors
///
/// - [`Error::MalformedArchive`] if a record is damaged or the records do
///   not fill the directory exactly
/// - [`Error::UnsupportedFeature`] for encrypted entries or entries stored
///   on another disk
pub fn decode_central_directory<R: Read + Seek>(
    reader: &mut R,
    trailer: &Trailer,
) -> Result<Vec<CentralDirectoryRecord>> {
    let min_size = trailer.entry_count.saturating_mul(CENTRAL_HEADER_LEN);
    if min_size > trailer.directory_size {
        return Err(Error::malformed(
            trailer.directory_offset,
            format!(
                "{} entries cannot fit in a {}-byte central directory",
                trailer.entry_count, trailer.directory_size
            ),
        ));
    }

    reader.seek(SeekFrom::Start(trailer.directory_offset))?;
    let mut raw = vec![0u8; trailer.directory_size as usize];
    reader
        .read_exact(&mut raw)
        .map_err(truncated(trailer.directory_offset, "central directory"))?;

    let mut cursor = Cursor::new(raw);
    let mut records = Vec::with_capacity(trailer.entry_count as usize);
    for _ in 0..trailer.entry_count {
        let offset = trailer.directory_offset + cursor.position();
        let record = CentralDirectoryRecord::decode(&mut cursor, offset)?;

        if record.flags & (FLAG_ENCRYPTED | FLAG_STRONG_ENCRYPTION) != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "encrypted entries",
            });
        }
        if record.disk_start != 0 {
            return Err(Error::UnsupportedFeature {
                feature: "multi-disk archives",
            });
        }
        records.push(record);
    }

    if cursor.position() != trailer.directory_size {
        return Err(Error::malformed(
            trailer.directory_offset + cursor.position(),
            format!(
                "central directory size mismatch: records end at {} of {} bytes",
                cursor.position(),
                trailer.directory_size
            ),
        ));
    }

    log::trace!(
        "decoded {} central directory records at {:#x}",
        records.len(),
        trailer.directory_offset
    );
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::encode_trailer;
    use crate::timestamp::DosDateTime;

    fn record(name: &str, offset: u64, flags: u16) -> CentralDirectoryRecord {
        CentralDirectoryRecord {
            version_made_by: 20,
            version_needed: 10,
            flags,
            method: 0,
            last_modified: DosDateTime::EPOCH,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: offset,
            name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            comment: Vec::new(),
        }
    }

    fn archive_with(records: &[CentralDirectoryRecord], count_override: Option<u64>) -> Vec<u8> {
        let mut directory = Vec::new();
        for r in records {
            r.write_to(&mut directory).unwrap();
        }
        let count = count_override.unwrap_or(records.len() as u64);
        let mut data = directory.clone();
        data.extend_from_slice(&encode_trailer(count, 0, directory.len() as u64, b""));
        data
    }

    #[test]
    fn test_decode_records_in_order() {
        let bytes = archive_with(&[record("a", 0, 0), record("b/c", 0, 0)], None);
        let mut cursor = Cursor::new(&bytes);
        let trailer = crate::format::decode_trailer(&mut cursor).unwrap();
        let records = decode_central_directory(&mut cursor, &trailer).unwrap();
        let names: Vec<_> = records.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names, vec![b"a".to_vec(), b"b/c".to_vec()]);
    }

    #[test]
    fn test_encrypted_entry_rejected() {
        let bytes = archive_with(&[record("secret", 0, FLAG_ENCRYPTED)], None);
        let mut cursor = Cursor::new(&bytes);
        let trailer = crate::format::decode_trailer(&mut cursor).unwrap();
        let err = decode_central_directory(&mut cursor, &trailer).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedFeature {
                feature: "encrypted entries"
            }
        ));
    }

    #[test]
    fn test_count_mismatch_is_malformed() {
        // Two records, EOCD claims one: leftover bytes in the directory.
        let bytes = archive_with(&[record("a", 0, 0), record("b", 0, 0)], Some(1));
        let mut cursor = Cursor::new(&bytes);
        let trailer = crate::format::decode_trailer(&mut cursor).unwrap();
        let err = decode_central_directory(&mut cursor, &trailer).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_impossible_count_is_malformed() {
        let bytes = archive_with(&[record("a", 0, 0)], Some(1000));
        let mut cursor = Cursor::new(&bytes);
        let trailer = crate::format::decode_trailer(&mut cursor).unwrap();
        let err = decode_central_directory(&mut cursor, &trailer).unwrap_err();
        assert!(err.is_corruption());
    }
}
