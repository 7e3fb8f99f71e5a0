//! Extra field handling: ZIP64 sizes and alignment padding.
//!
//! An extra field is a sequence of `[id: u16][size: u16][data; size]`
//! blocks. Some tools pad extra fields with raw zero bytes that do not form
//! a complete block; iteration stops quietly at such a tail and
//! [`strip`] keeps it in place.
//!
//! # Alignment padding
//!
//! Padding that moves a payload onto an alignment boundary lives in an
//! extra block with id [`ALIGNMENT_EXTRA_ID`]: two bytes holding the
//! alignment followed by zero fill. The block header and the alignment value
//! take six bytes, so any non-zero padding is at least six bytes long and a
//! shorter distance to the boundary is extended by whole alignment steps.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::LOCAL_HEADER_LEN;
use crate::{Error, Result};

/// Header id of the ZIP64 extended information block.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Header id of the alignment padding block.
pub const ALIGNMENT_EXTRA_ID: u16 = 0xD935;

/// Smallest non-zero alignment padding: block header plus alignment value.
pub const MIN_ALIGNMENT_PADDING: u64 = 6;

/// Largest alignment the padding block can record.
pub const MAX_ALIGNMENT: u64 = 1 << 15;

/// Iterator over the well-formed blocks of an extra field.
#[derive(Debug, Clone)]
pub struct ExtraFields<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ExtraFields<'a> {
    /// Byte position where iteration stopped.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for ExtraFields<'a> {
    type Item = (u16, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos..];
        if rest.len() < 4 {
            return None;
        }
        let id = u16::from_le_bytes([rest[0], rest[1]]);
        let size = usize::from(u16::from_le_bytes([rest[2], rest[3]]));
        if rest.len() < 4 + size {
            return None;
        }
        self.pos += 4 + size;
        Some((id, &rest[4..4 + size]))
    }
}

/// Iterates the blocks of an extra field.
pub fn fields(data: &[u8]) -> ExtraFields<'_> {
    ExtraFields { data, pos: 0 }
}

/// Returns the data of the first block with `id`.
pub fn find(data: &[u8], id: u16) -> Option<&[u8]> {
    fields(data).find(|(block_id, _)| *block_id == id).map(|(_, body)| body)
}

/// Returns `data` without any block carrying `id`.
pub fn strip(data: &[u8], id: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut iter = fields(data);
    let mut start = 0;
    while let Some((block_id, _)) = iter.next() {
        let end = iter.position();
        if block_id != id {
            out.extend_from_slice(&data[start..end]);
        }
        start = end;
    }
    out.extend_from_slice(&data[start..]);
    out
}

/// Returns `true` if `alignment` is 0 or a supported power of two.
pub fn is_valid_alignment(alignment: u64) -> bool {
    alignment == 0 || (alignment.is_power_of_two() && alignment <= MAX_ALIGNMENT)
}

/// Padding that moves a payload starting at `unpadded` onto `alignment`.
///
/// Returns 0 when no padding is needed, otherwise a value of at least
/// [`MIN_ALIGNMENT_PADDING`].
pub fn payload_padding(unpadded: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return 0;
    }
    let mut padding = (alignment - unpadded % alignment) % alignment;
    while padding != 0 && padding < MIN_ALIGNMENT_PADDING {
        padding += alignment;
    }
    padding
}

/// Padding to add to the extra field of a local header placed at
/// `candidate_offset` so that its payload lands on `alignment`.
///
/// Assumes the header carries no other extra blocks.
///
/// ```rust
/// use zipmend::format::compute_alignment_padding;
///
/// // Payload would start at 30 + 9 = 39; the next 4096 boundary is 4057 away.
/// assert_eq!(compute_alignment_padding(0, 9, 4096), 4057);
/// assert_eq!(compute_alignment_padding(0, 9, 0), 0);
/// // Distances shorter than a padding block are extended by one step.
/// assert_eq!(compute_alignment_padding(0, 3, 4), 7);
/// ```
pub fn compute_alignment_padding(candidate_offset: u64, name_len: u64, alignment: u64) -> u64 {
    payload_padding(candidate_offset + LOCAL_HEADER_LEN + name_len, alignment)
}

/// Encodes an alignment block occupying exactly `padding` bytes.
///
/// Returns an empty vector when `padding` is 0.
pub fn alignment_field(padding: u64, alignment: u64) -> Vec<u8> {
    if padding == 0 {
        return Vec::new();
    }
    debug_assert!(padding >= MIN_ALIGNMENT_PADDING);
    debug_assert!(padding - 4 <= u64::from(u16::MAX));

    let mut out = Vec::with_capacity(padding as usize);
    out.extend_from_slice(&ALIGNMENT_EXTRA_ID.to_le_bytes());
    out.extend_from_slice(&((padding - 4) as u16).to_le_bytes());
    out.extend_from_slice(&(alignment.min(MAX_ALIGNMENT) as u16).to_le_bytes());
    out.resize(padding as usize, 0);
    out
}

/// Reads the alignment recorded in an alignment block, if any.
pub fn read_alignment(data: &[u8]) -> Option<u64> {
    let body = find(data, ALIGNMENT_EXTRA_ID)?;
    if body.len() < 2 {
        return None;
    }
    let alignment = u64::from(u16::from_le_bytes([body[0], body[1]]));
    (alignment > 1 && alignment.is_power_of_two()).then_some(alignment)
}

/// Encodes a ZIP64 extended information block holding `values` in order.
pub fn zip64_field(values: &[u64]) -> Vec<u8> {
    if values.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(4 + values.len() * 8);
    out.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
    out.extend_from_slice(&((values.len() * 8) as u16).to_le_bytes());
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Replaces 32-bit sentinels with their ZIP64 values.
///
/// `targets` lists, in ZIP64 block order, the fields whose header value was
/// the sentinel. Each consumes the next 8 bytes of the block.
pub fn resolve_zip64(data: &[u8], targets: &mut [&mut u64], record_offset: u64) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    let body = find(data, ZIP64_EXTRA_ID).ok_or_else(|| {
        Error::malformed(record_offset, "size sentinel without ZIP64 extra field")
    })?;
    let mut cursor = body;
    for target in targets.iter_mut() {
        **target = cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| Error::malformed(record_offset, "ZIP64 extra field too short"))?;
    }
    Ok(())
}

/// Writes a zero-filled extra block of exactly `len` bytes.
///
/// Blocks shorter than a header are written as bare zeros.
pub(crate) fn write_filler<W: std::io::Write>(out: &mut W, len: usize) -> std::io::Result<()> {
    if len >= 4 {
        out.write_u16::<LittleEndian>(0)?;
        out.write_u16::<LittleEndian>((len - 4) as u16)?;
        out.write_all(&vec![0u8; len - 4])
    } else {
        out.write_all(&vec![0u8; len])
    }
}
