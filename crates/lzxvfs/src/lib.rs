//! Read-only virtual filesystem over segment-compressed archive containers.
//!
//! This crate exposes the contents of an archive file (by default `.lzx`) as a
//! browsable directory hierarchy. A host hands in real filesystem paths that
//! run *through* the archive file, e.g. `/home/user/disk.lzx/docs/readme.txt`,
//! and the layer:
//!
//! - opens the archive lazily and keeps exactly one open at a time
//! - rebuilds a directory tree from the archive's flat entry list once per load
//! - resolves nested paths against that tree
//! - serves random-access reads over entries stored as independently decoded
//!   segments, decoding at most one segment per read call
//! - extracts entries to disk, honoring a cooperative abort signal
//!
//! The container format itself is hidden behind [`ArchiveCodec`]. An in-memory
//! implementation lives in [`codec::memory`].
//!
//! # Example
//!
//! ```rust,ignore
//! use lzxvfs::codec::memory::{MemoryArchive, MemoryCodec};
//! use lzxvfs::{OpenMode, Vfs};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let archive = MemoryArchive::new().with_file("docs/readme.txt", b"hello")?;
//! let codec = MemoryCodec::new().with_archive("/data/disk.lzx", archive);
//! let mut vfs = Vfs::new(codec);
//!
//! for entry in vfs.read_dir("/data/disk.lzx/docs")? {
//!     println!("{} ({} bytes)", entry.name, entry.size);
//! }
//!
//! let mut handle = vfs.open_file("/data/disk.lzx/docs/readme.txt", OpenMode::Read)?;
//! let mut buf = [0u8; 16];
//! let n = vfs.read_file(&mut handle, &mut buf)?;
//! assert_eq!(&buf[..n], b"hello");
//! vfs.close_file(handle);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

// Cooperative cancellation
pub mod abort;

// Archive cache (one open archive per instance)
pub mod cache;

// Codec capability and bundled implementations
pub mod codec;

// Configuration
pub mod config;

// Error taxonomy and last-error tracking
pub mod error;

// Extraction to the host filesystem
pub mod extract;

// Path normalization
pub mod path;

// Segment-addressed reads
pub mod reader;

// Directory tree synthesized from flat entry names
pub mod tree;

// Per-instance facade
mod vfs;

pub use abort::AbortSignal;
pub use cache::{ArchiveCache, LoadedArchive};
pub use codec::{ArchiveCodec, ArchiveHandle, CodecError, CodecResult, FlatEntry, Segment};
pub use config::VfsConfig;
pub use error::{ErrorCode, ErrorState, VfsError};
pub use extract::{ExtractOutcome, ExtractReport, ExtractedFile, FileStatus, SkipReason};
pub use reader::FileHandle;
pub use tree::{DirectoryNode, DirectoryTree, EntryId, NodeId};
pub use vfs::{
    AbortScope, BatchMode, ContextVerb, DirEntryInfo, DiskSpace, DragEffect, EntryKind,
    FileAttributes, HostFunction, OpenMode, Properties, Vfs,
};

/// Result type for virtual filesystem operations.
pub type Result<T> = std::result::Result<T, VfsError>;

/// Version information for the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default container extension, compared case-insensitively and without the dot.
pub const DEFAULT_EXTENSION: &str = "lzx";

/// Default copy buffer size reported to hosts: 64 MiB.
pub const DEFAULT_COPY_BUFFER_SIZE: usize = 64 << 20;
