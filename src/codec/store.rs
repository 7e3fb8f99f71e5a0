//! Stored codec (no compression).

use std::io::{self, Read, Write};

use super::{CompressionMethod, Decoder, Encoder};

/// A decoder that passes payload bytes through unchanged.
pub struct StoreDecoder<R> {
    inner: R,
}

impl<R: Read> StoreDecoder<R> {
    /// Creates a new stored decoder over an already bounded payload.
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for StoreDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for StoreDecoder<R> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }
}

/// An encoder that writes content to the sink unchanged.
pub struct StoreEncoder<W> {
    inner: W,
}

impl<W: Write + Send> StoreEncoder<W> {
    /// Creates a new stored encoder.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + Send> Write for StoreEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder<W> for StoreEncoder<W> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }

    fn finish(mut self: Box<Self>) -> io::Result<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}
