//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;
use zipmend::format::{CentralDirectoryRecord, LocalFileHeader, encode_trailer};
use zipmend::{ArchiveOptions, CompressionMethod, DosDateTime, ZipArchive};

/// Creates a scratch directory and the path of an archive inside it.
///
/// The archive file itself does not exist yet. Keep the `TempDir` alive for
/// as long as the path is used.
pub fn scratch_archive() -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("test.zip");
    (dir, path)
}

/// Options for tests: defaults without the per-commit fsync.
pub fn fast_options() -> ArchiveOptions {
    ArchiveOptions::default().sync_on_commit(false)
}

/// Opens an archive with [`fast_options`].
pub fn open(path: &Path) -> ZipArchive {
    ZipArchive::open_with_options(path, fast_options()).expect("open archive")
}

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}

/// Creates an archive at `path` holding `entries`, stored, and closes it.
pub fn create_archive(path: &Path, entries: &[(&str, &[u8])]) {
    let archive = open(path);
    for (name, data) in entries {
        archive
            .add_bytes(name, data, CompressionMethod::Stored, 0)
            .expect("add entry");
    }
    archive.close().expect("close archive");
}

/// Builds a stored-only archive in memory without going through the
/// controller, so tests can assemble layouts the controller never writes.
///
/// Each entry is `(name, content, gap)`: `gap` zero bytes are written
/// before the entry's local header.
pub fn build_raw_archive(entries: &[(&str, &[u8], usize)], comment: &[u8]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut directory = Vec::new();
    for (name, content, gap) in entries {
        data.resize(data.len() + gap, 0);
        let offset = data.len() as u64;
        let crc = crc32fast::hash(content);
        let size = content.len() as u64;
        LocalFileHeader::new(
            10,
            0,
            CompressionMethod::STORED_ID,
            DosDateTime::EPOCH,
            crc,
            size,
            size,
            name.as_bytes(),
            &[],
        )
        .write_to(&mut data)
        .expect("write to vec");
        data.extend_from_slice(content);
        central_record(name, crc, size, offset)
            .write_to(&mut directory)
            .expect("write to vec");
    }
    let directory_offset = data.len() as u64;
    data.extend_from_slice(&directory);
    data.extend_from_slice(&encode_trailer(
        entries.len() as u64,
        directory_offset,
        directory.len() as u64,
        comment,
    ));
    data
}

/// A central record for a stored entry.
pub fn central_record(name: &str, crc: u32, size: u64, offset: u64) -> CentralDirectoryRecord {
    CentralDirectoryRecord {
        version_made_by: 20,
        version_needed: 10,
        flags: 0,
        method: CompressionMethod::STORED_ID,
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
}
