//! # zipmend
//!
//! An incremental ZIP archive engine.
//!
//! Build tools that package hundreds of files into an archive usually change
//! a handful of them between runs. `zipmend` edits an existing archive in
//! place: new and replaced entries go into reusable holes left by earlier
//! deletions, and only the central directory at the end of the file is
//! rewritten on commit. Output is a standard ZIP file (APPNOTE 6.3, with
//! ZIP64 records when sizes demand it) readable by any ZIP tool.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use zipmend::{CompressionMethod, Result, ZipArchive};
//!
//! fn main() -> Result<()> {
//!     let archive = ZipArchive::open("app.zip")?;
//!
//!     // Replace one file, remove another.
//!     archive.add_bytes("config.json", br#"{"debug":false}"#, CompressionMethod::Deflate, 0)?;
//!     archive.delete("stale.txt")?;
//!
//!     // Native libraries are page aligned so they can be mapped directly.
//!     archive.add_path("lib/libapp.so", "target/libapp.so", CompressionMethod::Stored, 4096)?;
//!
//!     archive.close()
//! }
//! ```
//!
//! ## Reading
//!
//! [`ZipArchive::read`] decodes an entry of an open archive. For read-only
//! access to any `Read + Seek` source, including archives stored inside
//! other archives, use [`ArchiveReader`]:
//!
//! ```rust,no_run
//! use zipmend::ArchiveReader;
//!
//! let mut reader = ArchiveReader::open("app.zip")?;
//! let names: Vec<_> = reader.entries().iter().map(|e| e.name.to_string()).collect();
//! let config = reader.read("config.json")?;
//! # Ok::<(), zipmend::Error>(())
//! ```
//!
//! ## Parallel Preparation
//!
//! Compression is the expensive part of an add and needs no archive state.
//! [`prepare_all`] encodes many sources on the rayon pool; the archive lock
//! is held only while each [`PreparedEntry`] is placed and written.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `deflate` | Yes | DEFLATE entries via `flate2` |
//! | `parallel` | Yes | Multi-threaded [`prepare_all`] with Rayon |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`]. Damaged archives are reported, never
//! repaired:
//!
//! ```rust,no_run
//! use zipmend::{Error, ZipArchive};
//!
//! match ZipArchive::open("maybe-broken.zip") {
//!     Ok(archive) => println!("{} entries", archive.len()?),
//!     Err(Error::MalformedArchive { offset, reason }) => {
//!         eprintln!("corrupt at {:#x}: {}", offset, reason);
//!     }
//!     Err(e @ Error::UnsupportedFeature { .. }) => eprintln!("{}", e),
//!     Err(e) => return Err(e),
//! }
//! # Ok::<(), zipmend::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

/// Buffer size for payload copies.
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod archive;
pub mod archive_path;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod free_space;
pub mod index;
pub mod options;
pub mod prepare;
pub mod read;
pub mod timestamp;

pub use archive::{Layout, Span, SpanKind, ZipArchive};
pub use archive_path::ArchivePath;
pub use codec::CompressionMethod;
pub use error::{Error, Result};
pub use free_space::{FreeRegion, FreeSpaceAllocator, Reservation};
pub use index::{Entry, EntryIndex};
pub use options::{ArchiveOptions, EntryOptions};
pub use prepare::{EntryRequest, EntrySource, PreparedEntry, prepare_all};
pub use read::{ArchiveReader, EntryView, NestedSource};
pub use timestamp::DosDateTime;
