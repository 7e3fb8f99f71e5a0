//! Fuzz target for entry name validation.
//!
//! Run with: cargo +nightly fuzz run archive_path

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(path) = zipmend::ArchivePath::new(name) else {
        return;
    };

    let text = path.as_str();
    assert_eq!(text, name);
    assert!(!text.starts_with('/'), "absolute name accepted: {:?}", text);
    assert!(!text.contains('\0'), "NUL byte accepted: {:?}", text);
    assert!(!text.contains('\\'), "backslash accepted: {:?}", text);

    let body = text.strip_suffix('/').unwrap_or(text);
    for segment in body.split('/') {
        assert!(
            !matches!(segment, "" | "." | ".."),
            "bad segment {:?} in {:?}",
            segment,
            text
        );
    }
    if let Some(parent) = path.parent() {
        assert!(text.starts_with(parent.as_str()));
    }
});
