//! Fuzz target for opening arbitrary bytes as a ZIP archive.
//!
//! Parsing must reject damaged input with an error, never a panic, and
//! decoding an accepted entry must stop at its recorded size.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::io::{Cursor, sink};

fuzz_target!(|data: &[u8]| {
    let Ok(mut reader) = zipmend::ArchiveReader::new(Cursor::new(data)) else {
        return;
    };

    let names: Vec<String> = reader
        .entries()
        .iter()
        .map(|entry| {
            assert!(entry.payload_offset >= entry.offset);
            assert!(entry.end() <= reader.trailer().directory_offset);
            entry.name.to_string()
        })
        .collect();

    for name in names {
        if let Ok(written) = reader.read_to(&name, &mut sink()) {
            let entry = reader.entry(&name).expect("listed entry");
            assert_eq!(written, entry.uncompressed_size);
        }
    }
});
