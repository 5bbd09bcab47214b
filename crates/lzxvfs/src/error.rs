//! Error taxonomy and the per-instance last-error channel.
//!
//! Every public [`Vfs`](crate::Vfs) operation returns a `Result` and also
//! records a numeric [`ErrorCode`] in its [`ErrorState`], so hosts that poll a
//! "last error" after each call keep working.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the virtual filesystem layer.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No supported archive could be located or opened for a path.
    #[error("no supported archive found for {}", .0.display())]
    NotFound(PathBuf),

    /// The path is well-formed but does not exist inside the archive tree,
    /// or names a directory where a file was expected.
    #[error("path not found in archive: {}", .0.display())]
    PathNotInArchive(PathBuf),

    /// A segment failed to decode or decoded to an empty payload.
    #[error("read fault in '{entry}' at segment {segment}: {reason}")]
    ReadFault {
        /// In-archive name of the entry being read
        entry: String,
        /// Index of the faulting segment
        segment: usize,
        /// Decoder-supplied reason
        reason: String,
    },

    /// The read cursor is at or past the end of the entry.
    #[error("end of stream")]
    EndOfStream,

    /// The file handle was opened against an archive that is no longer loaded.
    #[error("file handle refers to an archive that is no longer loaded")]
    StaleHandle,

    /// The operation is not implemented by this read-only layer.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Host filesystem I/O failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path the operation was acting on
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl VfsError {
    /// Numeric code recorded in the last-error channel for this error.
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::FILE_NOT_FOUND,
            Self::PathNotInArchive(_) => ErrorCode::PATH_NOT_FOUND,
            Self::ReadFault { .. } => ErrorCode::READ_FAULT,
            Self::EndOfStream => ErrorCode::SUCCESS,
            Self::StaleHandle => ErrorCode::INVALID_HANDLE,
            Self::Unsupported(_) => ErrorCode::NOT_SUPPORTED,
            Self::Io { .. } | Self::Config(_) => ErrorCode::GEN_FAILURE,
        }
    }

    /// Whether the error only marks a drained stream rather than a failure.
    pub const fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

/// Numeric last-error code.
///
/// Values follow the Win32 system error numbering that file manager hosts
/// expect from a virtual filesystem plugin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ErrorCode(u32);

impl ErrorCode {
    /// Operation succeeded.
    pub const SUCCESS: Self = Self(0);
    /// No archive file for the requested path.
    pub const FILE_NOT_FOUND: Self = Self(2);
    /// Path missing inside the archive.
    pub const PATH_NOT_FOUND: Self = Self(3);
    /// Handle no longer valid.
    pub const INVALID_HANDLE: Self = Self(6);
    /// Segment decode failed.
    pub const READ_FAULT: Self = Self(30);
    /// Host I/O or configuration failure.
    pub const GEN_FAILURE: Self = Self(31);
    /// Operation not supported.
    pub const NOT_SUPPORTED: Self = Self(50);

    /// Create a code from its raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw numeric value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this code denotes success.
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Short human-readable description.
    pub const fn description(self) -> &'static str {
        match self.0 {
            0 => "success",
            2 => "file not found",
            3 => "path not found",
            6 => "invalid handle",
            30 => "read fault",
            31 => "general failure",
            50 => "not supported",
            _ => "unknown error",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.0, self.description())
    }
}

/// Last-error slot owned by one virtual filesystem instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorState {
    last: ErrorCode,
}

impl ErrorState {
    /// Create a cleared error state.
    pub const fn new() -> Self {
        Self {
            last: ErrorCode::SUCCESS,
        }
    }

    /// Most recently recorded code.
    pub const fn last(&self) -> ErrorCode {
        self.last
    }

    /// Record a code.
    pub fn set(&mut self, code: ErrorCode) {
        self.last = code;
    }

    /// Reset to success.
    pub fn clear(&mut self) {
        self.last = ErrorCode::SUCCESS;
    }

    /// Record the outcome of an operation: success clears, errors set their code.
    pub fn record<T>(&mut self, result: &Result<T, VfsError>) {
        match result {
            Ok(_) => self.clear(),
            Err(e) => self.set(e.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_for_taxonomy() {
        assert_eq!(
            VfsError::NotFound(PathBuf::from("x.lzx")).code(),
            ErrorCode::FILE_NOT_FOUND
        );
        assert_eq!(
            VfsError::PathNotInArchive(PathBuf::from("a/b")).code(),
            ErrorCode::PATH_NOT_FOUND
        );
        assert_eq!(
            VfsError::ReadFault {
                entry: "a".to_string(),
                segment: 0,
                reason: "bad".to_string(),
            }
            .code(),
            ErrorCode::READ_FAULT
        );
        assert_eq!(VfsError::Unsupported("rename").code(), ErrorCode::NOT_SUPPORTED);
        assert_eq!(VfsError::StaleHandle.code(), ErrorCode::INVALID_HANDLE);
    }

    #[test]
    fn test_end_of_stream_is_not_an_error_code() {
        assert!(VfsError::EndOfStream.code().is_success());
        assert!(VfsError::EndOfStream.is_end_of_stream());
    }

    #[test]
    fn test_record_sets_and_clears() {
        let mut state = ErrorState::new();
        state.record::<()>(&Err(VfsError::Unsupported("write")));
        assert_eq!(state.last(), ErrorCode::NOT_SUPPORTED);

        state.record(&Ok(()));
        assert!(state.last().is_success());
    }

    #[test]
    fn test_display() {
        assert_eq!(ErrorCode::READ_FAULT.to_string(), "30 (read fault)");
        assert_eq!(ErrorCode::from_raw(999).description(), "unknown error");
    }
}
