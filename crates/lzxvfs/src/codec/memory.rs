//! In-memory codec.
//!
//! Archives are registered against host paths and built entry by entry.
//! Segment payloads are stored either raw or zlib-compressed and are only
//! inflated when a segment is decoded, so reads and extraction exercise the
//! same lazy decoding path a real container codec would. Open and decode
//! calls are counted for callers that want to observe caching behavior.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::Compression;
use flate2::read::{ZlibDecoder, ZlibEncoder};

use super::{ArchiveCodec, ArchiveHandle, CodecError, CodecResult, FlatEntry, Segment};
use crate::path::sanitize;

/// How segment payloads are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SegmentEncoding {
    /// Stored as-is
    #[default]
    Raw,
    /// Stored zlib-compressed
    Zlib,
}

/// Fault injected into a segment's decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFault {
    /// Decoding returns an error
    DecodeError,
    /// Decoding succeeds with an empty payload
    EmptyPayload,
}

/// Call counters shared by a codec and everything it hands out.
#[derive(Debug, Default)]
struct CodecStats {
    opens: AtomicUsize,
    decodes: AtomicUsize,
}

/// A segment held in memory.
#[derive(Debug, Clone)]
pub struct MemorySegment {
    encoding: SegmentEncoding,
    stored: Arc<[u8]>,
    decompressed_len: u64,
    fault: Option<SegmentFault>,
    stats: Arc<CodecStats>,
}

impl MemorySegment {
    /// Encode `data` into a segment.
    pub fn encode(data: &[u8], encoding: SegmentEncoding) -> CodecResult<Self> {
        let stored: Arc<[u8]> = match encoding {
            SegmentEncoding::Raw => Arc::from(data),
            SegmentEncoding::Zlib => {
                let mut encoder = ZlibEncoder::new(data, Compression::default());
                let mut compressed = Vec::new();
                encoder.read_to_end(&mut compressed).map_err(|e| {
                    CodecError::CompressionFailed(format!("zlib compression failed: {e}"))
                })?;
                Arc::from(compressed)
            }
        };

        Ok(Self {
            encoding,
            stored,
            decompressed_len: data.len() as u64,
            fault: None,
            stats: Arc::default(),
        })
    }

    /// Size of the stored (possibly compressed) payload.
    pub fn stored_len(&self) -> usize {
        self.stored.len()
    }

    fn attached(&self, stats: &Arc<CodecStats>) -> Self {
        Self {
            stats: Arc::clone(stats),
            ..self.clone()
        }
    }
}

impl Segment for MemorySegment {
    fn decompressed_len(&self) -> u64 {
        self.decompressed_len
    }

    fn decode(&self) -> CodecResult<Cow<'_, [u8]>> {
        self.stats.decodes.fetch_add(1, Ordering::Relaxed);

        match self.fault {
            Some(SegmentFault::DecodeError) => {
                return Err(CodecError::DecompressionFailed(
                    "injected decode fault".to_string(),
                ));
            }
            Some(SegmentFault::EmptyPayload) => return Ok(Cow::Borrowed(&[][..])),
            None => {}
        }

        match self.encoding {
            SegmentEncoding::Raw => Ok(Cow::Borrowed(&self.stored[..])),
            SegmentEncoding::Zlib => {
                let capacity = usize::try_from(self.decompressed_len).unwrap_or(0);
                let mut decoded = Vec::with_capacity(capacity);
                ZlibDecoder::new(&self.stored[..])
                    .read_to_end(&mut decoded)
                    .map_err(|e| {
                        CodecError::DecompressionFailed(format!("zlib decompression failed: {e}"))
                    })?;
                if decoded.len() as u64 != self.decompressed_len {
                    return Err(CodecError::DecompressionFailed(format!(
                        "expected {} bytes, got {}",
                        self.decompressed_len,
                        decoded.len()
                    )));
                }
                Ok(Cow::Owned(decoded))
            }
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    name: String,
    unpack_size: u64,
    segments: Vec<MemorySegment>,
}

/// Archive contents built in memory.
///
/// Entries are listed in insertion order. Adding two entries with the same
/// name keeps both; the directory tree decides which one wins.
#[derive(Debug, Clone, Default)]
pub struct MemoryArchive {
    entries: Vec<MemoryEntry>,
    encoding: SegmentEncoding,
}

impl MemoryArchive {
    /// Create an empty archive storing segments raw.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoding used for segments added after this call.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: SegmentEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Add an entry with an explicit declared size.
    ///
    /// The declared size may disagree with the segment lengths; readers treat
    /// whichever ends first as the end of the stream.
    pub fn with_entry<S: AsRef<[u8]>>(
        mut self,
        name: &str,
        unpack_size: u64,
        segments: &[S],
    ) -> CodecResult<Self> {
        let segments = segments
            .iter()
            .map(|data| MemorySegment::encode(data.as_ref(), self.encoding))
            .collect::<CodecResult<Vec<_>>>()?;
        self.entries.push(MemoryEntry {
            name: name.to_string(),
            unpack_size,
            segments,
        });
        Ok(self)
    }

    /// Add an entry made of the given segments.
    pub fn with_segments<S: AsRef<[u8]>>(self, name: &str, segments: &[S]) -> CodecResult<Self> {
        let unpack_size = segments.iter().map(|s| s.as_ref().len() as u64).sum();
        self.with_entry(name, unpack_size, segments)
    }

    /// Add an entry stored as a single segment (no segments when empty).
    pub fn with_file(self, name: &str, data: &[u8]) -> CodecResult<Self> {
        if data.is_empty() {
            self.with_segments::<&[u8]>(name, &[])
        } else {
            self.with_segments(name, &[data])
        }
    }

    /// Add an entry split into segments of at most `chunk_size` bytes.
    pub fn with_chunked_file(self, name: &str, data: &[u8], chunk_size: usize) -> CodecResult<Self> {
        let chunks: Vec<&[u8]> = data.chunks(chunk_size.max(1)).collect();
        self.with_segments(name, &chunks)
    }

    /// Make a segment of the most recently added entry named `name` fail.
    #[must_use]
    pub fn with_fault(mut self, name: &str, segment: usize, fault: SegmentFault) -> Self {
        if let Some(target) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.name == name)
            .and_then(|e| e.segments.get_mut(segment))
        {
            target.fault = Some(fault);
        }
        self
    }

    /// Number of entries, duplicates included.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

struct MemoryHandle {
    archive: MemoryArchive,
    stats: Arc<CodecStats>,
}

impl ArchiveHandle for MemoryHandle {
    fn list_entries(&self) -> CodecResult<Vec<FlatEntry>> {
        Ok(self
            .archive
            .entries
            .iter()
            .map(|entry| {
                let segments = entry
                    .segments
                    .iter()
                    .map(|s| Box::new(s.attached(&self.stats)) as Box<dyn Segment>)
                    .collect();
                FlatEntry::new(entry.name.clone(), entry.unpack_size, segments)
            })
            .collect())
    }
}

/// Codec serving archives registered in memory.
///
/// Clones share registrations made before cloning and share call counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryCodec {
    archives: HashMap<PathBuf, MemoryArchive>,
    stats: Arc<CodecStats>,
}

impl MemoryCodec {
    /// Create a codec with no archives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an archive under a host path.
    #[must_use]
    pub fn with_archive<P: AsRef<Path>>(mut self, path: P, archive: MemoryArchive) -> Self {
        self.archives.insert(sanitize(path), archive);
        self
    }

    /// Number of `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.stats.opens.load(Ordering::Relaxed)
    }

    /// Number of segment decodes so far.
    pub fn decode_count(&self) -> usize {
        self.stats.decodes.load(Ordering::Relaxed)
    }
}

impl ArchiveCodec for MemoryCodec {
    fn open(&self, path: &Path) -> CodecResult<Box<dyn ArchiveHandle>> {
        self.stats.opens.fetch_add(1, Ordering::Relaxed);

        let archive = self.archives.get(&sanitize(path)).ok_or_else(|| {
            CodecError::InvalidArchive(format!("no archive registered for {}", path.display()))
        })?;

        Ok(Box::new(MemoryHandle {
            archive: archive.clone(),
            stats: Arc::clone(&self.stats),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zlib_segment_decodes_lazily() {
        let data = vec![7u8; 4096];
        let segment = MemorySegment::encode(&data, SegmentEncoding::Zlib).expect("encode");
        assert!(segment.stored_len() < data.len());
        assert_eq!(segment.decompressed_len(), 4096);
        assert_eq!(segment.stats.decodes.load(Ordering::Relaxed), 0);

        let decoded = segment.decode().expect("decode");
        assert_eq!(decoded.as_ref(), data.as_slice());
        assert_eq!(segment.stats.decodes.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_chunked_file_lists_segments_in_order() {
        let archive = MemoryArchive::new()
            .with_chunked_file("big.bin", b"abcdefghij", 4)
            .expect("archive");
        let codec = MemoryCodec::new().with_archive("/x/a.lzx", archive);

        let handle = codec.open(Path::new("/x/a.lzx")).expect("open");
        let entries = handle.list_entries().expect("list");
        assert_eq!(entries.len(), 1);

        let lengths: Vec<u64> = entries[0]
            .segments()
            .iter()
            .map(|s| s.decompressed_len())
            .collect();
        assert_eq!(lengths, vec![4, 4, 2]);
        assert_eq!(entries[0].unpack_size(), 10);
        assert_eq!(entries[0].segment_total(), 10);
        assert_eq!(codec.open_count(), 1);
    }

    #[test]
    fn test_injected_faults() {
        let archive = MemoryArchive::new()
            .with_segments("f", &[b"one", b"two"])
            .expect("archive")
            .with_fault("f", 0, SegmentFault::DecodeError)
            .with_fault("f", 1, SegmentFault::EmptyPayload);
        let codec = MemoryCodec::new().with_archive("/a.lzx", archive);
        let entries = codec
            .open(Path::new("/a.lzx"))
            .and_then(|h| h.list_entries())
            .expect("entries");

        let segments = entries[0].segments();
        assert!(matches!(
            segments[0].decode(),
            Err(CodecError::DecompressionFailed(_))
        ));
        assert!(segments[1].decode().expect("decode").is_empty());
        assert_eq!(codec.decode_count(), 2);
    }

    #[test]
    fn test_unregistered_path_fails_to_open() {
        let codec = MemoryCodec::new();
        assert!(matches!(
            codec.open(Path::new("/nope.lzx")),
            Err(CodecError::InvalidArchive(_))
        ));
        assert_eq!(codec.open_count(), 1);
    }
}
