//! Payload spooling.
//!
//! A [`Spool`] buffers an encoded payload in memory until it grows past a
//! threshold, then moves it to an anonymous temporary file. The payload has
//! to be fully produced before the controller can size its reservation, and
//! the spool keeps that from requiring the whole payload in memory.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Default spill threshold: 8 MiB.
pub const DEFAULT_SPOOL_THRESHOLD: usize = 8 * 1024 * 1024;

enum Storage {
    Memory(Vec<u8>),
    File(File),
}

/// Write sink for encoded payloads.
pub struct Spool {
    storage: Storage,
    threshold: usize,
    len: u64,
}

impl std::fmt::Debug for Spool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spool")
            .field("len", &self.len)
            .field("spilled", &self.is_spilled())
            .finish()
    }
}

impl Spool {
    /// Creates an empty spool that spills once it exceeds `threshold` bytes.
    pub fn new(threshold: usize) -> Self {
        Self {
            storage: Storage::Memory(Vec::new()),
            threshold,
            len: 0,
        }
    }

    /// Creates a spool holding `data` in memory.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            len: data.len() as u64,
            threshold: usize::MAX,
            storage: Storage::Memory(data),
        }
    }

    /// Number of bytes written.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the content lives in a temporary file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.storage, Storage::File(_))
    }

    fn spill(&mut self) -> io::Result<()> {
        if let Storage::Memory(buffer) = &self.storage {
            let mut file = tempfile::tempfile()?;
            file.write_all(buffer)?;
            log::trace!("spooled payload spilled to disk after {} bytes", buffer.len());
            self.storage = Storage::File(file);
        }
        Ok(())
    }

    /// Converts the spool into a reader positioned at the first byte.
    pub fn into_reader(self) -> io::Result<SpoolReader> {
        let inner = match self.storage {
            Storage::Memory(buffer) => SpoolReaderInner::Memory(Cursor::new(buffer)),
            Storage::File(mut file) => {
                file.seek(SeekFrom::Start(0))?;
                SpoolReaderInner::File(file)
            }
        };
        Ok(SpoolReader {
            inner,
            len: self.len,
        })
    }
}

impl Write for Spool {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Storage::Memory(buffer) = &self.storage {
            if buffer.len().saturating_add(buf.len()) > self.threshold {
                self.spill()?;
            }
        }
        let n = match &mut self.storage {
            Storage::Memory(buffer) => {
                buffer.extend_from_slice(buf);
                buf.len()
            }
            Storage::File(file) => file.write(buf)?,
        };
        self.len += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.storage {
            Storage::Memory(_) => Ok(()),
            Storage::File(file) => file.flush(),
        }
    }
}

enum SpoolReaderInner {
    Memory(Cursor<Vec<u8>>),
    File(File),
}

/// Reader over a finished [`Spool`].
pub struct SpoolReader {
    inner: SpoolReaderInner,
    len: u64,
}

impl SpoolReader {
    /// Total payload length.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Rewinds to the first byte.
    pub fn rewind(&mut self) -> io::Result<()> {
        match &mut self.inner {
            SpoolReaderInner::Memory(cursor) => cursor.set_position(0),
            SpoolReaderInner::File(file) => {
                file.seek(SeekFrom::Start(0))?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SpoolReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpoolReader").field("len", &self.len).finish()
    }
}

impl Read for SpoolReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            SpoolReaderInner::Memory(cursor) => cursor.read(buf),
            SpoolReaderInner::File(file) => file.read(buf),
        }
    }
}
