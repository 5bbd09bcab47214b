//! Segment-addressed reads.
//!
//! An entry's payload is a run of independently decoded segments laid out
//! back-to-back in the entry's logical byte stream. A read locates the one
//! segment covering the cursor, decodes it, and copies from there up to the
//! end of that segment or of the caller's buffer. A read never crosses a
//! segment boundary, so each call costs at most one decode.

use tracing::warn;

use crate::codec::{FlatEntry, Segment};
use crate::tree::EntryId;
use crate::{Result, VfsError};

/// Cursor over an open archive entry.
///
/// Returned by [`Vfs::open_file`](crate::Vfs::open_file) and consumed by
/// [`Vfs::close_file`](crate::Vfs::close_file).
#[derive(Debug)]
pub struct FileHandle {
    entry: EntryId,
    offset: u64,
    generation: u64,
}

impl FileHandle {
    pub(crate) const fn new(entry: EntryId, generation: u64) -> Self {
        Self {
            entry,
            offset: 0,
            generation,
        }
    }

    /// Entry this handle reads.
    pub const fn entry(&self) -> EntryId {
        self.entry
    }

    /// Logical offset of the next read.
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Archive load generation the handle was opened against.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn advance(&mut self, count: usize) {
        self.offset = self.offset.saturating_add(count as u64);
    }
}

/// Where a logical offset falls inside an entry's segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentPosition {
    /// Index of the covering segment
    pub index: usize,
    /// Logical offset at which the segment starts
    pub start: u64,
    /// Decompressed length of the segment
    pub len: u64,
}

impl SegmentPosition {
    /// Offset of `offset` inside this segment.
    pub const fn intra_offset(&self, offset: u64) -> u64 {
        offset - self.start
    }

    /// Bytes left in this segment from `offset` on.
    pub const fn remaining(&self, offset: u64) -> u64 {
        self.len - self.intra_offset(offset)
    }
}

/// Find the segment covering `offset`.
///
/// Zero-length segments never cover anything. Returns `None` past the end of
/// the last segment.
pub fn locate(segments: &[Box<dyn Segment>], offset: u64) -> Option<SegmentPosition> {
    let mut start = 0u64;
    for (index, segment) in segments.iter().enumerate() {
        let len = segment.decompressed_len();
        let end = start.checked_add(len)?;
        if offset < end {
            return Some(SegmentPosition { index, start, len });
        }
        start = end;
    }
    None
}

/// Read from `entry` at `offset` into `buf`.
///
/// Returns the number of bytes copied; `0` at or past the end of the entry.
/// Decode failures and empty payloads are read faults and copy nothing.
pub fn read_at(entry: &FlatEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
    if offset >= entry.unpack_size() {
        return Ok(0);
    }

    let Some(position) = locate(entry.segments(), offset) else {
        return Ok(0);
    };

    let fault = |reason: String| {
        warn!(
            "Read fault in '{}' segment {}: {reason}",
            entry.name(),
            position.index
        );
        VfsError::ReadFault {
            entry: entry.name().to_string(),
            segment: position.index,
            reason,
        }
    };

    let payload = entry.segments()[position.index]
        .decode()
        .map_err(|e| fault(e.to_string()))?;
    if payload.is_empty() {
        return Err(fault("segment decoded to an empty payload".to_string()));
    }

    let intra = usize::try_from(position.intra_offset(offset))
        .ok()
        .filter(|&intra| intra < payload.len())
        .ok_or_else(|| {
            fault(format!(
                "segment decoded to {} bytes, offset {} requested",
                payload.len(),
                position.intra_offset(offset)
            ))
        })?;

    let remaining = usize::try_from(position.remaining(offset)).unwrap_or(usize::MAX);
    let count = remaining.min(payload.len() - intra).min(buf.len());
    buf[..count].copy_from_slice(&payload[intra..intra + count]);
    Ok(count)
}
