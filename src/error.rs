//! Error types for incremental ZIP archive operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when opening, editing, or reading archives, along with a
//! convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use zipmend::{CompressionMethod, Result, ZipArchive};
//!
//! fn add_manifest(path: &str) -> Result<()> {
//!     let archive = ZipArchive::open(path)?;
//!     archive.add_bytes("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n", CompressionMethod::Deflate, 0)?;
//!     archive.close()
//! }
//! ```
//!
//! ## Exhaustive Error Matching
//!
//! ```rust,no_run
//! use zipmend::{Error, ZipArchive};
//!
//! fn remove_if_present(path: &str, name: &str) -> zipmend::Result<bool> {
//!     let archive = ZipArchive::open(path)?;
//!     let removed = match archive.delete(name) {
//!         Ok(()) => true,
//!         // Absent entries are not fatal for this caller
//!         Err(Error::EntryNotFound { .. }) => false,
//!         Err(e) => return Err(e),
//!     };
//!     archive.close()?;
//!     Ok(removed)
//! }
//! ```

use std::io;

/// Helper struct for formatting CrcMismatch error messages.
struct CrcMismatchDisplay<'a> {
    entry_name: &'a str,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CRC mismatch for entry '{}': expected {:#010x}, got {:#010x}",
            self.entry_name, self.expected, self.actual
        )
    }
}

/// The main error type for archive operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Format | [`MalformedArchive`][Self::MalformedArchive] | Unparseable trailer or directory |
/// | Compatibility | [`UnsupportedFeature`][Self::UnsupportedFeature], [`UnsupportedMethod`][Self::UnsupportedMethod] | Encrypted or spanned archives |
/// | Lookup | [`EntryNotFound`][Self::EntryNotFound] | Absent entry name |
/// | Usage | [`InvalidState`][Self::InvalidState], [`InvalidEntryName`][Self::InvalidEntryName], [`InvalidAlignment`][Self::InvalidAlignment], [`InvalidComment`][Self::InvalidComment] | Programming errors |
/// | Integrity | [`CrcMismatch`][Self::CrcMismatch] | Payload corruption |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading or writing the archive file.
    ///
    /// I/O errors are propagated as-is and never retried internally; the
    /// caller owns the retry policy.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The trailer or central directory cannot be parsed.
    ///
    /// This is fatal to [`ZipArchive::open`]: the archive is never healed by
    /// guessing the missing content.
    ///
    /// [`ZipArchive::open`]: crate::ZipArchive::open
    #[error("Malformed archive at offset {offset:#x}: {reason}")]
    MalformedArchive {
        /// The byte offset where the problem was detected.
        offset: u64,
        /// A description of what was expected.
        reason: String,
    },

    /// The archive uses a feature this engine refuses to handle.
    ///
    /// Encrypted entries and multi-disk (spanned) archives are reported
    /// through this variant.
    #[error("Unsupported feature: {feature}")]
    UnsupportedFeature {
        /// The name of the unsupported feature.
        feature: &'static str,
    },

    /// An entry's payload uses a compression method other than STORE or DEFLATE.
    ///
    /// Listing such an archive works; only decoding the payload fails.
    #[error("Unsupported compression method {method} for entry '{path}'")]
    UnsupportedMethod {
        /// The raw method id from the header.
        method: u16,
        /// The entry name.
        path: String,
    },

    /// An entry was not found in the archive.
    #[error("Entry not found: {path}")]
    EntryNotFound {
        /// The name that was not found.
        path: String,
    },

    /// An operation was attempted on a closed archive handle.
    #[error("Invalid state: cannot {operation} a closed archive")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
    },

    /// An entry name failed validation.
    ///
    /// See [`ArchivePath::new`](crate::ArchivePath::new) for the rules.
    #[error("Invalid entry name: {0}")]
    InvalidEntryName(String),

    /// A requested payload alignment is neither zero nor a power of two.
    #[error("invalid alignment {alignment}: must be 0 or a power of two no larger than 32768")]
    InvalidAlignment {
        /// The alignment that was requested.
        alignment: u64,
    },

    /// An archive comment does not fit the 16-bit length field of the
    /// end of central directory record.
    #[error("invalid archive comment: {len} bytes exceeds the 65535-byte limit")]
    InvalidComment {
        /// Length of the rejected comment.
        len: usize,
    },

    /// An invalid DEFLATE level was provided.
    ///
    /// ```rust
    /// use zipmend::{ArchiveOptions, Error};
    ///
    /// assert!(ArchiveOptions::new().deflate_level(9).is_ok());
    /// assert!(matches!(
    ///     ArchiveOptions::new().deflate_level(12),
    ///     Err(Error::InvalidCompressionLevel { level: 12 })
    /// ));
    /// ```
    #[error("invalid compression level {level}: must be 0-9")]
    InvalidCompressionLevel {
        /// The invalid level that was provided.
        level: u32,
    },

    /// The CRC-32 of a decoded payload does not match the directory.
    #[error("{}", CrcMismatchDisplay { entry_name: path, expected: *expected, actual: *actual })]
    CrcMismatch {
        /// The entry name.
        path: String,
        /// The CRC recorded in the central directory.
        expected: u32,
        /// The CRC of the decoded payload.
        actual: u32,
    },
}

impl Error {
    /// Returns `true` if this error indicates a damaged archive or payload.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::MalformedArchive { .. } | Error::CrcMismatch { .. }
        )
    }

    /// Returns `true` if this error is related to unsupported features or methods.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFeature { .. } | Error::UnsupportedMethod { .. }
        )
    }

    /// Returns `true` if the caller may reasonably continue after this error.
    ///
    /// - `EntryNotFound`: the archive is unchanged, the caller decides
    /// - `Io` (transient kinds only): `WouldBlock`, `Interrupted`, `TimedOut`
    ///
    /// Everything else is fatal to the operation that produced it.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::EntryNotFound { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Returns the entry name associated with this error, if any.
    pub fn entry_name(&self) -> Option<&str> {
        match self {
            Error::EntryNotFound { path } => Some(path.as_str()),
            Error::CrcMismatch { path, .. } => Some(path.as_str()),
            Error::UnsupportedMethod { path, .. } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Creates a MalformedArchive error.
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Error::MalformedArchive {
            offset,
            reason: reason.into(),
        }
    }

    /// Creates an EntryNotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Error::EntryNotFound { path: path.into() }
    }
}

/// A specialized Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_malformed_display() {
        let err = Error::malformed(0x40, "bad central directory signature");
        assert_eq!(
            err.to_string(),
            "Malformed archive at offset 0x40: bad central directory signature"
        );
        assert!(err.is_corruption());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_unsupported_feature() {
        let err = Error::UnsupportedFeature {
            feature: "encrypted entries",
        };
        assert!(err.is_unsupported());
        assert_eq!(err.to_string(), "Unsupported feature: encrypted entries");
    }

    #[test]
    fn test_entry_not_found() {
        let err = Error::not_found("a.txt");
        assert!(err.is_recoverable());
        assert_eq!(err.entry_name(), Some("a.txt"));
        assert_eq!(err.to_string(), "Entry not found: a.txt");
    }

    #[test]
    fn test_invalid_state() {
        let err = Error::InvalidState { operation: "add to" };
        assert_eq!(err.to_string(), "Invalid state: cannot add to a closed archive");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_invalid_comment() {
        let err = Error::InvalidComment { len: 70_000 };
        assert_eq!(
            err.to_string(),
            "invalid archive comment: 70000 bytes exceeds the 65535-byte limit"
        );
        assert!(!err.is_corruption());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_crc_mismatch_display() {
        let err = Error::CrcMismatch {
            path: "lib/x86/libfoo.so".into(),
            expected: 0x1234,
            actual: 0xabcd,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch for entry 'lib/x86/libfoo.so': expected 0x00001234, got 0x0000abcd"
        );
        assert!(err.is_corruption());
        assert_eq!(err.entry_name(), Some("lib/x86/libfoo.so"));
    }

    #[test]
    fn test_is_recoverable_transient_io_errors() {
        for kind in [
            io::ErrorKind::WouldBlock,
            io::ErrorKind::Interrupted,
            io::ErrorKind::TimedOut,
        ] {
            let err = Error::Io(io::Error::new(kind, "transient"));
            assert!(err.is_recoverable(), "{:?} should be recoverable", kind);
        }
        let err = Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
