//! Archive codec capability.
//!
//! The filesystem layer never parses a container itself. A codec opens an
//! archive file, lists its entries as a flat collection, and decodes
//! individual segments on demand. Everything above this module only relies
//! on the three traits defined here.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use thiserror::Error;

pub mod memory;

/// Errors reported by a codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// I/O error while reading the container.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The container is malformed or not recognized.
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// A segment could not be decoded.
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),

    /// Compression failed while building an archive.
    #[error("compression failed: {0}")]
    CompressionFailed(String),
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// One independently decodable chunk of an entry's payload.
///
/// Segments of an entry cover its logical byte range back-to-back: segment
/// `i` starts exactly where segment `i - 1` ends.
pub trait Segment: fmt::Debug + Send {
    /// Number of bytes this segment decodes to.
    fn decompressed_len(&self) -> u64;

    /// Decode the segment. May be expensive; must be idempotent.
    fn decode(&self) -> CodecResult<Cow<'_, [u8]>>;
}

/// An opened archive.
pub trait ArchiveHandle: Send {
    /// List every entry in the archive. Called once per load.
    fn list_entries(&self) -> CodecResult<Vec<FlatEntry>>;
}

/// Capability to open archive files.
pub trait ArchiveCodec: Send {
    /// Open the archive stored at `path`.
    fn open(&self, path: &Path) -> CodecResult<Box<dyn ArchiveHandle>>;
}

/// One logical file stored inside an archive.
#[derive(Debug)]
pub struct FlatEntry {
    name: String,
    unpack_size: u64,
    segments: Vec<Box<dyn Segment>>,
}

impl FlatEntry {
    /// Create an entry from its full in-archive name, declared size and segments.
    pub fn new(name: impl Into<String>, unpack_size: u64, segments: Vec<Box<dyn Segment>>) -> Self {
        Self {
            name: name.into(),
            unpack_size,
            segments,
        }
    }

    /// Full in-archive path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared decompressed size.
    pub const fn unpack_size(&self) -> u64 {
        self.unpack_size
    }

    /// Segments in logical order.
    pub fn segments(&self) -> &[Box<dyn Segment>] {
        &self.segments
    }

    /// Sum of the segments' decompressed lengths (saturating).
    pub fn segment_total(&self) -> u64 {
        self.segments
            .iter()
            .fold(0u64, |acc, s| acc.saturating_add(s.decompressed_len()))
    }
}
