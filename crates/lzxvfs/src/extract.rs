//! Extraction of archive entries to the host filesystem.
//!
//! Entries are streamed segment by segment into a truncated target file.
//! The first decode or write failure stops the file and leaves whatever was
//! written on disk. The abort signal is polled before every segment; an abort
//! closes the current file short and ends the batch without an error.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::abort::{AbortSignal, should_abort};
use crate::codec::FlatEntry;

/// How a single extracted file ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Every segment was written
    Complete,
    /// A segment failed to decode; earlier segments are on disk
    DecodeFailed {
        /// Failing segment index
        segment: usize,
        /// Decoder-supplied reason
        reason: String,
    },
    /// Creating or writing the target failed
    WriteFailed(String),
    /// The abort signal was raised mid-file
    Aborted,
}

/// Why a requested name produced no file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No archive could be loaded for the name
    ArchiveNotFound,
    /// The parent directory does not exist in the archive
    DirectoryNotFound,
    /// The parent exists but has no such child
    NameNotFound,
    /// The name resolves to a directory
    NotAFile,
}

/// A file written during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Requested (sanitized) source path
    pub source: PathBuf,
    /// Host file written
    pub target: PathBuf,
    /// Payload bytes handed to the writer
    pub bytes_written: u64,
    /// How the file ended
    pub status: FileStatus,
}

impl ExtractedFile {
    /// Whether the whole entry made it to disk.
    pub fn is_complete(&self) -> bool {
        self.status == FileStatus::Complete
    }
}

/// Result for one requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// A target file was written (possibly partially)
    Written(ExtractedFile),
    /// The name was skipped
    Skipped {
        /// Requested (sanitized) source path
        source: PathBuf,
        /// Why it was skipped
        reason: SkipReason,
    },
}

/// Per-entry results of a batch extraction.
///
/// Names after an abort are not processed and have no outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    outcomes: Vec<ExtractOutcome>,
    aborted: bool,
}

impl ExtractReport {
    pub(crate) fn push(&mut self, outcome: ExtractOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.aborted = true;
    }

    /// Outcomes in request order.
    pub fn outcomes(&self) -> &[ExtractOutcome] {
        &self.outcomes
    }

    /// Whether the batch stopped because of the abort signal.
    pub const fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Files written, complete or not.
    pub fn written(&self) -> impl Iterator<Item = &ExtractedFile> {
        self.outcomes.iter().filter_map(|outcome| match outcome {
            ExtractOutcome::Written(file) => Some(file),
            ExtractOutcome::Skipped { .. } => None,
        })
    }

    /// Number of files written completely.
    pub fn completed_count(&self) -> usize {
        self.written().filter(|file| file.is_complete()).count()
    }

    /// Number of skipped names.
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, ExtractOutcome::Skipped { .. }))
            .count()
    }
}

/// Stream `entry` into `target`.
pub fn extract_entry(
    entry: &FlatEntry,
    source: PathBuf,
    target: PathBuf,
    create_directories: bool,
    abort: Option<&AbortSignal>,
) -> ExtractedFile {
    let (bytes_written, status) = stream_segments(entry, &target, create_directories, abort);

    match &status {
        FileStatus::Complete => debug!(
            "Extracted '{}' to {} ({bytes_written} bytes)",
            entry.name(),
            target.display()
        ),
        FileStatus::Aborted => debug!(
            "Extraction of '{}' aborted after {bytes_written} bytes",
            entry.name()
        ),
        FileStatus::DecodeFailed { segment, reason } => warn!(
            "Extraction of '{}' stopped at segment {segment}: {reason}",
            entry.name()
        ),
        FileStatus::WriteFailed(reason) => warn!(
            "Extraction of '{}' to {} failed: {reason}",
            entry.name(),
            target.display()
        ),
    }

    ExtractedFile {
        source,
        target,
        bytes_written,
        status,
    }
}

fn stream_segments(
    entry: &FlatEntry,
    target: &Path,
    create_directories: bool,
    abort: Option<&AbortSignal>,
) -> (u64, FileStatus) {
    if create_directories {
        if let Some(parent) = target.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return (
                    0,
                    FileStatus::WriteFailed(format!("create {}: {e}", parent.display())),
                );
            }
        }
    }

    let file = match File::create(target) {
        Ok(file) => file,
        Err(e) => {
            return (
                0,
                FileStatus::WriteFailed(format!("create {}: {e}", target.display())),
            );
        }
    };

    let mut out = BufWriter::new(file);
    let mut written = 0u64;
    let mut status = FileStatus::Complete;

    for (index, segment) in entry.segments().iter().enumerate() {
        if should_abort(abort) {
            status = FileStatus::Aborted;
            break;
        }

        let payload = match segment.decode() {
            Ok(payload) => payload,
            Err(e) => {
                status = FileStatus::DecodeFailed {
                    segment: index,
                    reason: e.to_string(),
                };
                break;
            }
        };

        if let Err(e) = out.write_all(&payload) {
            status = FileStatus::WriteFailed(e.to_string());
            break;
        }
        written += payload.len() as u64;
    }

    if let Err(e) = out.flush() {
        if status == FileStatus::Complete {
            status = FileStatus::WriteFailed(e.to_string());
        }
    }

    (written, status)
}
