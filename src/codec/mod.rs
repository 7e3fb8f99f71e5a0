//! Payload codecs for ZIP entries.
//!
//! Entries are either stored verbatim (method 0) or compressed with raw
//! DEFLATE (method 8). Any other method id found in an existing archive is
//! carried through as [`CompressionMethod::Unknown`]: such entries can be
//! listed, kept, deleted and copied raw, but not decoded.
//!
//! Payloads are produced into a [`Spool`] so that large inputs never have to
//! be held in memory before their final size is known.

#[cfg(feature = "deflate")]
pub mod deflate;

pub mod spool;
mod store;

use std::fmt;
use std::io::{self, BufRead, Write};

use crate::{Error, Result};

pub use spool::{Spool, SpoolReader};
pub use store::{StoreDecoder, StoreEncoder};

#[cfg(feature = "deflate")]
pub use deflate::{DeflateDecoder, DeflateEncoder, DeflateEncoderOptions};

/// Compression method of an entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Raw DEFLATE stream (RFC 1951).
    #[default]
    Deflate,
    /// A method id this crate cannot decode.
    Unknown(u16),
}

impl CompressionMethod {
    /// Method id for stored payloads.
    pub const STORED_ID: u16 = 0;
    /// Method id for DEFLATE payloads.
    pub const DEFLATE_ID: u16 = 8;

    /// Maps a header method id to a method.
    pub fn from_id(id: u16) -> Self {
        match id {
            Self::STORED_ID => Self::Stored,
            Self::DEFLATE_ID => Self::Deflate,
            other => Self::Unknown(other),
        }
    }

    /// Returns the id written into headers.
    pub fn id(&self) -> u16 {
        match self {
            Self::Stored => Self::STORED_ID,
            Self::Deflate => Self::DEFLATE_ID,
            Self::Unknown(id) => *id,
        }
    }

    /// Returns `true` if payloads with this method can be written and decoded.
    pub fn is_supported(&self) -> bool {
        match self {
            Self::Stored => true,
            Self::Deflate => cfg!(feature = "deflate"),
            Self::Unknown(_) => false,
        }
    }

    /// Minimum "version needed to extract" for this method.
    pub(crate) fn version_needed(&self) -> u16 {
        match self {
            Self::Stored => 10,
            _ => 20,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => write!(f, "Stored"),
            Self::Deflate => write!(f, "Deflate"),
            Self::Unknown(id) => write!(f, "Unknown({})", id),
        }
    }
}

/// A decoder that turns an entry payload back into its content.
pub trait Decoder: io::Read {
    /// Returns the method this decoder handles.
    fn method(&self) -> CompressionMethod;
}

/// An encoder that turns entry content into a payload.
pub trait Encoder<W>: Write + Send {
    /// Returns the method this encoder produces.
    fn method(&self) -> CompressionMethod;

    /// Finishes encoding and returns the sink.
    fn finish(self: Box<Self>) -> io::Result<W>;
}

/// Builds an encoder writing a `method` payload into `sink`.
///
/// `path` is only used for error reporting.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] for methods that cannot be produced,
/// including DEFLATE when the `deflate` feature is disabled.
pub fn build_encoder<W: Write + Send + 'static>(
    method: CompressionMethod,
    level: u32,
    sink: W,
    path: &str,
) -> Result<Box<dyn Encoder<W>>> {
    #[cfg(not(feature = "deflate"))]
    let _ = level;

    match method {
        CompressionMethod::Stored => Ok(Box::new(StoreEncoder::new(sink))),

        #[cfg(feature = "deflate")]
        CompressionMethod::Deflate => Ok(Box::new(DeflateEncoder::new(
            sink,
            &DeflateEncoderOptions::with_level(level),
        ))),

        other => Err(Error::UnsupportedMethod {
            method: other.id(),
            path: path.to_string(),
        }),
    }
}

/// Builds a decoder reading a `method` payload from `input`.
///
/// The caller bounds `input` to the payload's compressed size.
pub fn build_decoder<'a, R: BufRead + 'a>(
    method: CompressionMethod,
    input: R,
    path: &str,
) -> Result<Box<dyn Decoder + 'a>> {
    match method {
        CompressionMethod::Stored => Ok(Box::new(StoreDecoder::new(input))),

        #[cfg(feature = "deflate")]
        CompressionMethod::Deflate => Ok(Box::new(DeflateDecoder::new(input))),

        other => Err(Error::UnsupportedMethod {
            method: other.id(),
            path: path.to_string(),
        }),
    }
}
