//! Local file headers, central directory records and data descriptors.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::extra::{self, ZIP64_EXTRA_ID};
use super::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, LOCAL_HEADER_LEN,
    LOCAL_HEADER_SIGNATURE, VERSION_ZIP64, ZIP64_MARKER_32, needs_zip64, truncated,
};
use crate::timestamp::DosDateTime;
use crate::{Error, Result};

fn size_field(value: u64, zip64: bool) -> u32 {
    if zip64 { ZIP64_MARKER_32 } else { value as u32 }
}

/// Local file header preceding each payload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)] // fields mirror APPNOTE section 4.3
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub last_modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub name: Vec<u8>,
    /// Extra field as stored, including any ZIP64 block.
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    /// Builds a header for a new entry.
    ///
    /// A ZIP64 block carrying both sizes is placed first in the extra field
    /// when either size overflows 32 bits; `trailing_extra` follows it.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version_needed: u16,
        flags: u16,
        method: u16,
        last_modified: DosDateTime,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
        name: &[u8],
        trailing_extra: &[u8],
    ) -> Self {
        let mut extra = Self::zip64_block(compressed_size, uncompressed_size);
        let version_needed = if extra.is_empty() {
            version_needed
        } else {
            version_needed.max(VERSION_ZIP64)
        };
        extra.extend_from_slice(trailing_extra);
        Self {
            version_needed,
            flags,
            method,
            last_modified,
            crc32,
            compressed_size,
            uncompressed_size,
            name: name.to_vec(),
            extra,
        }
    }

    /// ZIP64 block a local header needs for these sizes (empty if none).
    pub fn zip64_block(compressed_size: u64, uncompressed_size: u64) -> Vec<u8> {
        if needs_zip64(compressed_size) || needs_zip64(uncompressed_size) {
            extra::zip64_field(&[uncompressed_size, compressed_size])
        } else {
            Vec::new()
        }
    }

    fn is_zip64(&self) -> bool {
        needs_zip64(self.compressed_size) || needs_zip64(self.uncompressed_size)
    }

    /// Decodes a header located at `offset`.
    ///
    /// Sizes are resolved through the ZIP64 block when the header holds the
    /// 32-bit sentinel. Headers that defer sizes to a data descriptor report
    /// whatever the header fields contain.
    pub fn decode<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let mut fixed = [0u8; LOCAL_HEADER_LEN as usize];
        reader
            .read_exact(&mut fixed)
            .map_err(truncated(offset, "local file header"))?;
        let mut c = &fixed[..];

        let signature = c.read_u32::<LittleEndian>()?;
        if signature != LOCAL_HEADER_SIGNATURE {
            return Err(Error::malformed(
                offset,
                format!("bad local file header signature {:#010x}", signature),
            ));
        }

        let version_needed = c.read_u16::<LittleEndian>()?;
        let flags = c.read_u16::<LittleEndian>()?;
        let method = c.read_u16::<LittleEndian>()?;
        let time = c.read_u16::<LittleEndian>()?;
        let date = c.read_u16::<LittleEndian>()?;
        let crc32 = c.read_u32::<LittleEndian>()?;
        let compressed = c.read_u32::<LittleEndian>()?;
        let uncompressed = c.read_u32::<LittleEndian>()?;
        let name_len = c.read_u16::<LittleEndian>()?;
        let extra_len = c.read_u16::<LittleEndian>()?;

        let mut name = vec![0u8; usize::from(name_len)];
        reader
            .read_exact(&mut name)
            .map_err(truncated(offset, "local file header name"))?;
        let mut extra_data = vec![0u8; usize::from(extra_len)];
        reader
            .read_exact(&mut extra_data)
            .map_err(truncated(offset, "local file header extra field"))?;

        let mut compressed_size = u64::from(compressed);
        let mut uncompressed_size = u64::from(uncompressed);
        {
            let mut targets: Vec<&mut u64> = Vec::with_capacity(2);
            if uncompressed == ZIP64_MARKER_32 {
                targets.push(&mut uncompressed_size);
            }
            if compressed == ZIP64_MARKER_32 {
                targets.push(&mut compressed_size);
            }
            extra::resolve_zip64(&extra_data, &mut targets, offset)?;
        }

        Ok(Self {
            version_needed,
            flags,
            method,
            last_modified: DosDateTime::from_fields(time, date),
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra: extra_data,
        })
    }

    /// Encoded length: fixed part, name and extra field.
    pub fn encoded_len(&self) -> u64 {
        LOCAL_HEADER_LEN + self.name.len() as u64 + self.extra.len() as u64
    }

    /// Writes the header.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let zip64 = self.is_zip64();
        out.write_u32::<LittleEndian>(LOCAL_HEADER_SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.method)?;
        out.write_u16::<LittleEndian>(self.last_modified.time())?;
        out.write_u16::<LittleEndian>(self.last_modified.date())?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(size_field(self.compressed_size, zip64))?;
        out.write_u32::<LittleEndian>(size_field(self.uncompressed_size, zip64))?;
        out.write_u16::<LittleEndian>(self.name.len() as u16)?;
        out.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        out.write_all(&self.name)?;
        out.write_all(&self.extra)
    }

    /// Encodes the header into a new buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len() as usize);
        // Writing into a Vec cannot fail.
        let _ = self.write_to(&mut out);
        out
    }
}

/// Central directory record describing one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)] // fields mirror APPNOTE section 4.3
pub struct CentralDirectoryRecord {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub last_modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub disk_start: u32,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u64,
    pub name: Vec<u8>,
    /// Extra field without the ZIP64 block, which is derived on encode.
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryRecord {
    /// Decodes a record located at `offset`.
    pub fn decode<R: Read>(reader: &mut R, offset: u64) -> Result<Self> {
        let mut fixed = [0u8; CENTRAL_HEADER_LEN as usize];
        reader
            .read_exact(&mut fixed)
            .map_err(truncated(offset, "central directory record"))?;
        let mut c = &fixed[..];

        let signature = c.read_u32::<LittleEndian>()?;
        if signature != CENTRAL_HEADER_SIGNATURE {
            return Err(Error::malformed(
                offset,
                format!("bad central directory signature {:#010x}", signature),
            ));
        }

        let version_made_by = c.read_u16::<LittleEndian>()?;
        let version_needed = c.read_u16::<LittleEndian>()?;
        let flags = c.read_u16::<LittleEndian>()?;
        let method = c.read_u16::<LittleEndian>()?;
        let time = c.read_u16::<LittleEndian>()?;
        let date = c.read_u16::<LittleEndian>()?;
        let crc32 = c.read_u32::<LittleEndian>()?;
        let compressed = c.read_u32::<LittleEndian>()?;
        let uncompressed = c.read_u32::<LittleEndian>()?;
        let name_len = c.read_u16::<LittleEndian>()?;
        let extra_len = c.read_u16::<LittleEndian>()?;
        let comment_len = c.read_u16::<LittleEndian>()?;
        let disk_start = c.read_u16::<LittleEndian>()?;
        let internal_attributes = c.read_u16::<LittleEndian>()?;
        let external_attributes = c.read_u32::<LittleEndian>()?;
        let local_offset = c.read_u32::<LittleEndian>()?;

        let mut name = vec![0u8; usize::from(name_len)];
        let mut extra_data = vec![0u8; usize::from(extra_len)];
        let mut comment = vec![0u8; usize::from(comment_len)];
        let map = truncated(offset, "central directory record");
        reader.read_exact(&mut name).map_err(map)?;
        reader.read_exact(&mut extra_data).map_err(map)?;
        reader.read_exact(&mut comment).map_err(map)?;

        let mut compressed_size = u64::from(compressed);
        let mut uncompressed_size = u64::from(uncompressed);
        let mut local_header_offset = u64::from(local_offset);
        {
            let mut targets: Vec<&mut u64> = Vec::with_capacity(3);
            if uncompressed == ZIP64_MARKER_32 {
                targets.push(&mut uncompressed_size);
            }
            if compressed == ZIP64_MARKER_32 {
                targets.push(&mut compressed_size);
            }
            if local_offset == ZIP64_MARKER_32 {
                targets.push(&mut local_header_offset);
            }
            extra::resolve_zip64(&extra_data, &mut targets, offset)?;
        }

        Ok(Self {
            version_made_by,
            version_needed,
            flags,
            method,
            last_modified: DosDateTime::from_fields(time, date),
            crc32,
            compressed_size,
            uncompressed_size,
            disk_start: u32::from(disk_start),
            internal_attributes,
            external_attributes,
            local_header_offset,
            name,
            extra: extra::strip(&extra_data, ZIP64_EXTRA_ID),
            comment,
        })
    }

    fn zip64_values(&self) -> Vec<u64> {
        let mut values = Vec::new();
        if needs_zip64(self.uncompressed_size) {
            values.push(self.uncompressed_size);
        }
        if needs_zip64(self.compressed_size) {
            values.push(self.compressed_size);
        }
        if needs_zip64(self.local_header_offset) {
            values.push(self.local_header_offset);
        }
        values
    }

    /// Encoded length including the derived ZIP64 block.
    pub fn encoded_len(&self) -> u64 {
        let zip64 = self.zip64_values();
        let zip64_len = if zip64.is_empty() { 0 } else { 4 + 8 * zip64.len() };
        CENTRAL_HEADER_LEN
            + self.name.len() as u64
            + (zip64_len + self.extra.len()) as u64
            + self.comment.len() as u64
    }

    /// Writes the record.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let zip64 = extra::zip64_field(&self.zip64_values());
        let version_needed = if zip64.is_empty() {
            self.version_needed
        } else {
            self.version_needed.max(VERSION_ZIP64)
        };

        out.write_u32::<LittleEndian>(CENTRAL_HEADER_SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.version_made_by)?;
        out.write_u16::<LittleEndian>(version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.method)?;
        out.write_u16::<LittleEndian>(self.last_modified.time())?;
        out.write_u16::<LittleEndian>(self.last_modified.date())?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(size_field(
            self.compressed_size,
            needs_zip64(self.compressed_size),
        ))?;
        out.write_u32::<LittleEndian>(size_field(
            self.uncompressed_size,
            needs_zip64(self.uncompressed_size),
        ))?;
        out.write_u16::<LittleEndian>(self.name.len() as u16)?;
        out.write_u16::<LittleEndian>((zip64.len() + self.extra.len()) as u16)?;
        out.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        out.write_u16::<LittleEndian>(self.disk_start as u16)?;
        out.write_u16::<LittleEndian>(self.internal_attributes)?;
        out.write_u32::<LittleEndian>(self.external_attributes)?;
        out.write_u32::<LittleEndian>(size_field(
            self.local_header_offset,
            needs_zip64(self.local_header_offset),
        ))?;
        out.write_all(&self.name)?;
        out.write_all(&zip64)?;
        out.write_all(&self.extra)?;
        out.write_all(&self.comment)
    }
}

/// Data descriptor trailing a payload whose header deferred CRC and sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)] // fields mirror APPNOTE section 4.3
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Whether the optional `PK\x07\x08` signature is present.
    pub signed: bool,
    /// Whether sizes are 8 bytes wide.
    pub zip64: bool,
}

impl DataDescriptor {
    /// Decodes a descriptor at `offset`.
    ///
    /// The signature is optional, so a leading `PK\x07\x08` is only taken as
    /// a signature when it differs from `expected_crc`.
    pub fn decode<R: Read>(
        reader: &mut R,
        offset: u64,
        zip64: bool,
        expected_crc: u32,
    ) -> Result<Self> {
        let map = truncated(offset, "data descriptor");
        let body_len = if zip64 { 20 } else { 12 };
        let mut buf = [0u8; 24];
        reader.read_exact(&mut buf[..4]).map_err(map)?;
        let first = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let signed = first == DATA_DESCRIPTOR_SIGNATURE && expected_crc != DATA_DESCRIPTOR_SIGNATURE;

        let mut body = if signed {
            reader.read_exact(&mut buf[..body_len]).map_err(map)?;
            &buf[..body_len]
        } else {
            reader.read_exact(&mut buf[4..body_len]).map_err(map)?;
            &buf[..body_len]
        };

        let crc32 = body.read_u32::<LittleEndian>()?;
        let (compressed_size, uncompressed_size) = if zip64 {
            (
                body.read_u64::<LittleEndian>()?,
                body.read_u64::<LittleEndian>()?,
            )
        } else {
            (
                u64::from(body.read_u32::<LittleEndian>()?),
                u64::from(body.read_u32::<LittleEndian>()?),
            )
        };

        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
            signed,
            zip64,
        })
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> u64 {
        let signature = if self.signed { 4 } else { 0 };
        let body = if self.zip64 { 20 } else { 12 };
        signature + body
    }

    /// Writes the descriptor.
    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        if self.signed {
            out.write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIGNATURE)?;
        }
        out.write_u32::<LittleEndian>(self.crc32)?;
        if self.zip64 {
            out.write_u64::<LittleEndian>(self.compressed_size)?;
            out.write_u64::<LittleEndian>(self.uncompressed_size)?;
        } else {
            out.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            out.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }
        Ok(())
    }
}
