//! Tests for archives the engine must refuse, and for damage it must report
//! without repairing.

mod common;

use std::fs;
use std::io::Cursor;

use common::{build_raw_archive, central_record, open, scratch_archive};
use zipmend::format::{LocalFileHeader, encode_trailer};
use zipmend::{ArchiveReader, CompressionMethod, DosDateTime, Error, ZipArchive};

fn sample() -> Vec<u8> {
    build_raw_archive(&[("a.txt", b"alpha" as &[u8], 0), ("b.txt", b"beta", 0)], b"")
}

/// Offset of the EOCD in an archive without a comment.
fn eocd(bytes: &[u8]) -> usize {
    bytes.len() - 22
}

fn open_bytes(bytes: Vec<u8>) -> zipmend::Result<ArchiveReader<Cursor<Vec<u8>>>> {
    ArchiveReader::new(Cursor::new(bytes))
}

fn assert_malformed(bytes: Vec<u8>) {
    match open_bytes(bytes) {
        Err(Error::MalformedArchive { .. }) => {}
        other => panic!("expected MalformedArchive, got {:?}", other.map(|r| r.len())),
    }
}

fn assert_unsupported(bytes: Vec<u8>) {
    match open_bytes(bytes) {
        Err(Error::UnsupportedFeature { .. }) => {}
        other => panic!("expected UnsupportedFeature, got {:?}", other.map(|r| r.len())),
    }
}

// ============================================================================
// Trailer damage
// ============================================================================

#[test]
fn test_sample_is_valid() {
    let mut reader = open_bytes(sample()).unwrap();
    assert_eq!(reader.len(), 2);
    assert_eq!(reader.read("b.txt").unwrap(), b"beta");
}

#[test]
fn test_too_short_and_garbage() {
    assert_malformed(Vec::new());
    assert_malformed(vec![0u8; 10]);
    assert_malformed(vec![0x42; 4096]);
}

#[test]
fn test_truncated_trailer() {
    let mut bytes = sample();
    bytes.truncate(bytes.len() - 3);
    assert_malformed(bytes);
}

#[test]
fn test_comment_length_must_reach_eof() {
    let mut bytes = sample();
    let at = eocd(&bytes);
    bytes[at + 20] = 5;
    assert_malformed(bytes);
}

#[test]
fn test_directory_offset_out_of_range() {
    let mut bytes = sample();
    let at = eocd(&bytes);
    bytes[at + 16..at + 20].copy_from_slice(&0x7fff_0000u32.to_le_bytes());
    assert_malformed(bytes);
}

#[test]
fn test_entry_count_mismatch() {
    let mut bytes = sample();
    let at = eocd(&bytes);
    bytes[at + 8..at + 10].copy_from_slice(&1u16.to_le_bytes());
    bytes[at + 10..at + 12].copy_from_slice(&1u16.to_le_bytes());
    assert_malformed(bytes);
}

#[test]
fn test_multi_disk_rejected() {
    let mut bytes = sample();
    let at = eocd(&bytes);
    bytes[at + 4..at + 6].copy_from_slice(&1u16.to_le_bytes());
    assert_unsupported(bytes);
}

// ============================================================================
// Directory damage
// ============================================================================

#[test]
fn test_bad_central_signature() {
    let mut bytes = sample();
    let reader = open_bytes(bytes.clone()).unwrap();
    let directory = reader.trailer().directory_offset as usize;
    bytes[directory] = b'X';
    assert_malformed(bytes);
}

#[test]
fn test_bad_local_header_signature() {
    let mut bytes = sample();
    bytes[0] = b'X';
    assert_malformed(bytes);
}

#[test]
fn test_encrypted_entry_rejected() {
    let mut bytes = sample();
    let reader = open_bytes(bytes.clone()).unwrap();
    let directory = reader.trailer().directory_offset as usize;
    // General purpose flags sit 8 bytes into a central record.
    bytes[directory + 8] |= 1;
    assert_unsupported(bytes);
}

#[test]
fn test_overlapping_spans_rejected() {
    let mut data = Vec::new();
    LocalFileHeader::new(10, 0, 0, DosDateTime::EPOCH, crc32fast::hash(b"x"), 1, 1, b"a", &[])
        .write_to(&mut data)
        .unwrap();
    data.push(b'x');

    let crc = crc32fast::hash(b"x");
    let mut directory = Vec::new();
    central_record("a", crc, 1, 0).write_to(&mut directory).unwrap();
    central_record("b", crc, 1, 0).write_to(&mut directory).unwrap();
    let directory_offset = data.len() as u64;
    data.extend_from_slice(&directory);
    data.extend_from_slice(&encode_trailer(2, directory_offset, directory.len() as u64, b""));

    assert_malformed(data);
}

#[test]
fn test_span_crossing_directory_rejected() {
    let mut data = Vec::new();
    LocalFileHeader::new(10, 0, 0, DosDateTime::EPOCH, 0, 0, 0, b"a", &[])
        .write_to(&mut data)
        .unwrap();
    // The record claims far more payload than precedes the directory.
    let mut directory = Vec::new();
    central_record("a", 0, 500, 0).write_to(&mut directory).unwrap();
    let directory_offset = data.len() as u64;
    data.extend_from_slice(&directory);
    data.extend_from_slice(&encode_trailer(1, directory_offset, directory.len() as u64, b""));

    assert_malformed(data);
}

#[test]
fn test_overflowing_zip64_size_rejected() {
    let mut data = Vec::new();
    LocalFileHeader::new(10, 0, 0, DosDateTime::EPOCH, 0, 0, 0, b"a", &[])
        .write_to(&mut data)
        .unwrap();
    // The size only fits in the ZIP64 block and wraps when added to the
    // header length.
    let mut directory = Vec::new();
    central_record("a", 0, u64::MAX - 5, 0)
        .write_to(&mut directory)
        .unwrap();
    let directory_offset = data.len() as u64;
    data.extend_from_slice(&directory);
    data.extend_from_slice(&encode_trailer(1, directory_offset, directory.len() as u64, b""));

    assert_malformed(data.clone());

    let (_dir, path) = scratch_archive();
    fs::write(&path, &data).unwrap();
    assert!(matches!(
        ZipArchive::open(&path),
        Err(Error::MalformedArchive { .. })
    ));
    assert_eq!(fs::read(&path).unwrap(), data);
}

// ============================================================================
// Payload damage and foreign methods
// ============================================================================

#[test]
fn test_corrupt_payload_reports_crc_mismatch() {
    let mut bytes = sample();
    // a.txt payload starts after the 30-byte header and 5-byte name.
    bytes[35] ^= 0xFF;
    let mut reader = open_bytes(bytes).unwrap();
    let err = reader.read("a.txt").unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(err.entry_name(), Some("a.txt"));
    assert_eq!(reader.read("b.txt").unwrap(), b"beta");
}

#[test]
fn test_unknown_method_listed_but_not_decoded() {
    let mut bytes = sample();
    let reader = open_bytes(bytes.clone()).unwrap();
    let directory = reader.trailer().directory_offset as usize;
    // Compression method sits 10 bytes into a central record.
    bytes[directory + 10..directory + 12].copy_from_slice(&14u16.to_le_bytes());

    let (_dir, path) = scratch_archive();
    fs::write(&path, &bytes).unwrap();
    let archive = open(&path);
    let entry = archive.get("a.txt").unwrap();
    assert_eq!(entry.method, CompressionMethod::Unknown(14));
    assert!(matches!(
        archive.read("a.txt"),
        Err(Error::UnsupportedMethod { method: 14, .. })
    ));

    // The entry survives edits around it.
    archive.delete("b.txt").unwrap();
    archive.close().unwrap();
    let archive = open(&path);
    assert_eq!(archive.get("a.txt").unwrap().method, CompressionMethod::Unknown(14));
}

#[test]
fn test_open_never_modifies_a_malformed_file() {
    let (_dir, path) = scratch_archive();
    let mut bytes = sample();
    bytes.truncate(bytes.len() - 1);
    fs::write(&path, &bytes).unwrap();

    let err = ZipArchive::open(&path).unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(fs::read(&path).unwrap(), bytes);
}
