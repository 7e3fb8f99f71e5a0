//! ZIP format constants, record definitions, and the binary codec.
//!
//! Everything in this module is a pure function over bytes: records are
//! decoded from readers and encoded into writers, and no placement decisions
//! are made here. Multi-byte fields are little-endian throughout.
//!
//! An archive laid out by this crate looks like:
//!
//! ```text
//! [local header | name | extra | payload]*  (free regions may sit between)
//! [central directory record]*
//! [zip64 end of central directory + locator]  (only when needed)
//! [end of central directory | comment]
//! ```

pub mod directory;
pub mod extra;
pub mod records;
pub mod trailer;

use std::io;

use crate::Error;

pub use directory::decode_central_directory;
pub use extra::{ALIGNMENT_EXTRA_ID, ZIP64_EXTRA_ID, compute_alignment_padding};
pub use records::{CentralDirectoryRecord, DataDescriptor, LocalFileHeader};
pub use trailer::{Trailer, decode_trailer, encode_trailer};

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
/// Central directory record signature (`PK\x01\x02`).
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4b50;
/// ZIP64 end of central directory signature (`PK\x06\x06`).
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4b50;
/// ZIP64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4b50;
/// Optional data descriptor signature (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: u64 = 30;
/// Fixed part of a central directory record.
pub const CENTRAL_HEADER_LEN: u64 = 46;
/// Fixed part of the end of central directory record.
pub const EOCD_LEN: u64 = 22;
/// Fixed part of the ZIP64 end of central directory record.
pub const ZIP64_EOCD_LEN: u64 = 56;
/// ZIP64 end of central directory locator.
pub const ZIP64_LOCATOR_LEN: u64 = 20;

/// Longest archive comment the EOCD can describe.
pub const MAX_COMMENT_LEN: usize = u16::MAX as usize;

/// Sentinel meaning "see the ZIP64 extra field" in 32-bit fields.
pub const ZIP64_MARKER_32: u32 = u32::MAX;
/// Sentinel meaning "see the ZIP64 record" in 16-bit count fields.
pub const ZIP64_MARKER_16: u16 = u16::MAX;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 1 << 0;
/// General purpose flag: sizes and CRC follow the payload in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// General purpose flag: strong encryption.
pub const FLAG_STRONG_ENCRYPTION: u16 = 1 << 6;
/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// Version needed to extract ZIP64 records.
pub const VERSION_ZIP64: u16 = 45;
/// "Version made by" written for new entries: MS-DOS host, APPNOTE 2.0.
pub const VERSION_MADE_BY: u16 = 20;

/// MS-DOS directory attribute.
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Returns `true` if a 64-bit value cannot be stored in a 32-bit field.
#[inline]
pub fn needs_zip64(value: u64) -> bool {
    value >= u64::from(ZIP64_MARKER_32)
}

/// Maps an I/O error hit while decoding a record at `offset`.
///
/// Running out of bytes inside a record means the archive is truncated,
/// which is a format problem rather than an I/O failure.
pub(crate) fn truncated(offset: u64, what: &'static str) -> impl Fn(io::Error) -> Error + Copy {
    move |e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::malformed(offset, format!("truncated {}", what))
        } else {
            Error::Io(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signatures_match_ascii() {
        assert_eq!(&LOCAL_HEADER_SIGNATURE.to_le_bytes(), b"PK\x03\x04");
        assert_eq!(&CENTRAL_HEADER_SIGNATURE.to_le_bytes(), b"PK\x01\x02");
        assert_eq!(&EOCD_SIGNATURE.to_le_bytes(), b"PK\x05\x06");
        assert_eq!(&ZIP64_EOCD_SIGNATURE.to_le_bytes(), b"PK\x06\x06");
        assert_eq!(&ZIP64_LOCATOR_SIGNATURE.to_le_bytes(), b"PK\x06\x07");
        assert_eq!(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes(), b"PK\x07\x08");
    }

    #[test]
    fn test_needs_zip64() {
        assert!(!needs_zip64(0xFFFF_FFFE));
        assert!(needs_zip64(0xFFFF_FFFF));
        assert!(needs_zip64(1 << 40));
    }

    #[test]
    fn test_truncated_maps_eof() {
        let err = truncated(12, "local header")(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, Error::MalformedArchive { offset: 12, .. }));
        let err = truncated(12, "local header")(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io(_)));
    }
}
