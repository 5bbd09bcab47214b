//! Per-instance virtual filesystem facade.
//!
//! [`Vfs`] ties the archive cache, the directory tree, the segmented reader
//! and the extraction engine together behind the operations a file manager
//! host calls. Every public operation returns a `Result` and records its
//! outcome in the instance's last-error slot.

use std::ffi::OsStr;
use std::io;
use std::ops::{BitOr, Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, info, trace};

use crate::abort::{AbortSignal, should_abort};
use crate::cache::{ArchiveCache, LoadedArchive};
use crate::codec::{ArchiveCodec, FlatEntry};
use crate::config::VfsConfig;
use crate::error::{ErrorCode, ErrorState};
use crate::extract::{ExtractOutcome, ExtractReport, FileStatus, SkipReason, extract_entry};
use crate::path::{is_current_dir, sanitize};
use crate::reader::{FileHandle, read_at};
use crate::tree::{DirectoryNode, DirectoryTree, NodeId};
use crate::{Result, VfsError};

/// File attribute bits reported to hosts (Win32 values).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FileAttributes(u32);

impl FileAttributes {
    /// Directory
    pub const DIRECTORY: Self = Self(0x10);
    /// Plain file
    pub const NORMAL: Self = Self(0x80);
    /// Stored compressed
    pub const COMPRESSED: Self = Self(0x800);

    /// Attributes from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for FileAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Kind of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Backed by an archive entry
    File,
    /// Synthesized from entry names
    Directory,
}

/// Stat result for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// Final path segment (the archive file name for the archive root)
    pub name: String,
    /// File or directory
    pub kind: EntryKind,
    /// Declared decompressed size, 0 for directories
    pub size: u64,
    /// Host attribute bits
    pub attributes: FileAttributes,
}

impl DirEntryInfo {
    fn describe(name: String, node: &DirectoryNode, archive: &LoadedArchive) -> Self {
        match node.file().and_then(|id| archive.entry(id)) {
            Some(entry) => Self {
                name,
                kind: EntryKind::File,
                size: entry.unpack_size(),
                attributes: FileAttributes::NORMAL | FileAttributes::COMPRESSED,
            },
            None => Self {
                name,
                kind: EntryKind::Directory,
                size: 0,
                attributes: FileAttributes::DIRECTORY,
            },
        }
    }

    /// Whether this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Requested access for [`Vfs::open_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read-only access
    Read,
    /// Write access (never granted)
    Write,
}

/// What the host should do when the user activates an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextVerb {
    /// The path does not resolve
    Fail,
    /// Let the host apply its default action (directories)
    Default,
    /// Extract the file first
    Extract,
    /// Switch to the copy already extracted at this host path
    Change(PathBuf),
}

/// Drag-and-drop effect offered to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragEffect {
    /// No drag support
    None,
    /// Copy out of the archive
    Copy,
}

/// How the host should drive batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One call per entry
    CallForEach,
    /// One call for the whole selection
    CallOnce,
}

/// Host functions a plugin can switch off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum HostFunction {
    Move,
    Delete,
    MakeDir,
    Print,
    Properties,
    Rename,
    SetAttributes,
    Shortcut,
    ClipCut,
    ClipPaste,
    ClipPasteShortcut,
    Undo,
    Duplicate,
    SplitJoin,
    SetTime,
    ViewTile,
    SetComment,
}

/// Host functions that make no sense on a read-only archive.
const DISABLED_FUNCTIONS: &[HostFunction] = &[
    HostFunction::Move,
    HostFunction::Delete,
    HostFunction::MakeDir,
    HostFunction::Print,
    HostFunction::Properties,
    HostFunction::Rename,
    HostFunction::SetAttributes,
    HostFunction::Shortcut,
    HostFunction::ClipCut,
    HostFunction::ClipPaste,
    HostFunction::ClipPasteShortcut,
    HostFunction::Undo,
    HostFunction::Duplicate,
    HostFunction::SplitJoin,
    HostFunction::SetTime,
    HostFunction::ViewTile,
    HostFunction::SetComment,
];

/// Capabilities reported to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Properties {
    /// Subfolders can be browsed
    pub can_show_subfolders: bool,
    /// Entries can be extracted
    pub extractable: bool,
    /// Host may render thumbnails
    pub show_thumbnails: bool,
    /// Secure delete is available
    pub secure_delete: bool,
    /// Deleted entries go to a trash
    pub trash: bool,
    /// Entries expose a content hash
    pub file_hash: bool,
    /// Path completion is available
    pub path_completion: bool,
    /// Full-path rename is available
    pub full_rename: bool,
    /// Drag-and-drop effect
    pub drag_effect: DragEffect,
    /// Batch call mode
    pub batch_mode: BatchMode,
    /// Copy buffer size in bytes
    pub copy_buffer_size: usize,
    /// Host functions to disable
    pub disabled_functions: &'static [HostFunction],
}

/// Free space report. Archives are read-only, so everything is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskSpace {
    /// Bytes available to the caller
    pub available: u64,
    /// Total bytes
    pub total: u64,
    /// Free bytes
    pub free: u64,
}

#[derive(Debug)]
struct CurrentDir {
    generation: u64,
    node: NodeId,
    relative: PathBuf,
}

struct Located {
    node: NodeId,
    relative: PathBuf,
}

enum Miss {
    Archive(VfsError),
    Directory(PathBuf),
    Name(PathBuf),
}

impl Miss {
    const fn skip_reason(&self) -> SkipReason {
        match self {
            Self::Archive(_) => SkipReason::ArchiveNotFound,
            Self::Directory(_) => SkipReason::DirectoryNotFound,
            Self::Name(_) => SkipReason::NameNotFound,
        }
    }
}

impl From<Miss> for VfsError {
    fn from(miss: Miss) -> Self {
        match miss {
            Miss::Archive(e) => e,
            Miss::Directory(path) | Miss::Name(path) => Self::PathNotInArchive(path),
        }
    }
}

/// Read-only virtual filesystem over one archive at a time.
///
/// Paths are host paths running through the archive file, e.g.
/// `/data/disk.lzx/docs/readme.txt`. The instance is single-session: every
/// operation that may load an archive takes `&mut self`.
pub struct Vfs<C> {
    config: VfsConfig,
    cache: ArchiveCache<C>,
    current: Option<CurrentDir>,
    abort: Option<AbortSignal>,
    errors: ErrorState,
}

impl<C: ArchiveCodec> Vfs<C> {
    /// Create an instance with the default configuration.
    pub fn new(codec: C) -> Self {
        let config = VfsConfig::default();
        Self {
            cache: ArchiveCache::new(codec, &config.extension),
            config,
            current: None,
            abort: None,
            errors: ErrorState::new(),
        }
    }

    /// Create an instance with a validated configuration.
    pub fn with_config(codec: C, config: VfsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: ArchiveCache::new(codec, &config.extension),
            config,
            current: None,
            abort: None,
            errors: ErrorState::new(),
        })
    }

    /// Active configuration.
    pub const fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// The codec archives are opened with.
    pub const fn codec(&self) -> &C {
        self.cache.codec()
    }

    /// Host path of the loaded archive file.
    pub fn loaded_path(&self) -> Option<&Path> {
        self.cache.loaded().map(LoadedArchive::path)
    }

    /// Directory tree of the loaded archive.
    pub fn tree(&self) -> Option<&DirectoryTree> {
        self.cache.loaded().map(LoadedArchive::tree)
    }

    /// Most recent error code. Success after a successful operation.
    pub const fn last_error(&self) -> ErrorCode {
        self.errors.last()
    }

    /// Reset the last-error code.
    pub fn clear_error(&mut self) {
        self.errors.clear();
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        self.errors.record(&result);
        result
    }

    /// Load the archive containing `path`.
    ///
    /// Returns `path` relative to the archive file. Paths inside the archive
    /// already loaded are served without reopening it.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<PathBuf> {
        let result = self.cache.ensure_loaded(path.as_ref());
        self.record(result)
    }

    /// Navigate to a directory inside an archive.
    pub fn change_dir<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let result = self.enter_dir(path.as_ref()).map(|_| ());
        self.record(result)
    }

    fn enter_dir(&mut self, path: &Path) -> Result<NodeId> {
        let relative = self.cache.ensure_loaded(path)?;
        let loaded = self.loaded()?;
        let generation = loaded.generation();

        let node = loaded
            .tree()
            .resolve(&relative)
            .filter(|&id| {
                let node = loaded.tree().node(id);
                node.is_dir() || !node.children().is_empty()
            })
            .ok_or_else(|| VfsError::PathNotInArchive(relative.clone()))?;

        trace!("Current directory is now {}", relative.display());
        self.current = Some(CurrentDir {
            generation,
            node,
            relative,
        });
        Ok(node)
    }

    /// Last directory navigated to, relative to the archive root.
    ///
    /// `None` before any navigation and after a different archive was loaded.
    pub fn current_dir(&self) -> Option<&Path> {
        self.current_entry().map(|current| current.relative.as_path())
    }

    /// Tree node of [`current_dir`](Self::current_dir).
    pub fn current_node(&self) -> Option<NodeId> {
        self.current_entry().map(|current| current.node)
    }

    fn current_entry(&self) -> Option<&CurrentDir> {
        let generation = self.cache.loaded()?.generation();
        self.current
            .as_ref()
            .filter(|current| current.generation == generation)
    }

    fn loaded(&self) -> Result<&LoadedArchive> {
        self.cache
            .loaded()
            .ok_or_else(|| VfsError::NotFound(PathBuf::new()))
    }

    /// Resolve the parent of `path`, then its final segment.
    fn locate(&mut self, path: &Path) -> std::result::Result<Located, Miss> {
        let relative = self.cache.ensure_loaded(path).map_err(Miss::Archive)?;
        let loaded = self.loaded().map_err(Miss::Archive)?;

        if is_current_dir(&relative) {
            return Ok(Located {
                node: DirectoryTree::ROOT,
                relative,
            });
        }

        let tree = loaded.tree();
        let parent = relative
            .parent()
            .map_or(Some(DirectoryTree::ROOT), |parent| tree.resolve(parent))
            .ok_or_else(|| Miss::Directory(relative.clone()))?;

        let node = relative
            .file_name()
            .and_then(OsStr::to_str)
            .and_then(|name| tree.lookup(parent, name))
            .ok_or_else(|| Miss::Name(relative.clone()))?;

        Ok(Located { node, relative })
    }

    fn stat_inner(&mut self, path: &Path) -> Result<DirEntryInfo> {
        let located = self.locate(path)?;
        let loaded = self.loaded()?;

        let name = located
            .relative
            .file_name()
            .or_else(|| loaded.path().file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(DirEntryInfo::describe(
            name,
            loaded.tree().node(located.node),
            loaded,
        ))
    }

    /// Size, kind and attributes of a file or directory.
    pub fn stat<P: AsRef<Path>>(&mut self, path: P) -> Result<DirEntryInfo> {
        let result = self.stat_inner(path.as_ref());
        self.record(result)
    }

    /// Declared size of a file. Directories fail with `PathNotInArchive`.
    pub fn file_size<P: AsRef<Path>>(&mut self, path: P) -> Result<u64> {
        let path = path.as_ref();
        let result = self.stat_inner(path).and_then(|info| match info.kind {
            EntryKind::File => Ok(info.size),
            EntryKind::Directory => Err(VfsError::PathNotInArchive(sanitize(path))),
        });
        self.record(result)
    }

    /// Attribute bits of a file or directory.
    pub fn file_attributes<P: AsRef<Path>>(&mut self, path: P) -> Result<FileAttributes> {
        let result = self.stat_inner(path.as_ref()).map(|info| info.attributes);
        self.record(result)
    }

    /// Children of a directory, in name order.
    pub fn read_dir<P: AsRef<Path>>(&mut self, path: P) -> Result<Vec<DirEntryInfo>> {
        let result = self.list_dir(path.as_ref());
        self.record(result)
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let dir = self.enter_dir(path)?;
        let loaded = self.loaded()?;
        let tree = loaded.tree();

        Ok(tree
            .node(dir)
            .children()
            .iter()
            .map(|(name, &child)| DirEntryInfo::describe(name.clone(), tree.node(child), loaded))
            .collect())
    }

    /// Open a file for reading.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P, mode: OpenMode) -> Result<FileHandle> {
        let result = self.open_inner(path.as_ref(), mode);
        self.record(result)
    }

    fn open_inner(&mut self, path: &Path, mode: OpenMode) -> Result<FileHandle> {
        if mode == OpenMode::Write {
            return Err(VfsError::Unsupported("open for writing"));
        }

        let located = self.locate(path)?;
        let loaded = self.loaded()?;
        let entry = loaded
            .tree()
            .node(located.node)
            .file()
            .ok_or(VfsError::PathNotInArchive(located.relative))?;

        Ok(FileHandle::new(entry, loaded.generation()))
    }

    /// Read from an open file.
    ///
    /// Copies at most up to the end of the segment under the cursor. A read at
    /// the end of the entry fails with [`VfsError::EndOfStream`], which leaves
    /// the last-error code cleared.
    pub fn read_file(&mut self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        let result = self.read_inner(handle, buf);
        self.record(result)
    }

    fn read_inner(&self, handle: &mut FileHandle, buf: &mut [u8]) -> Result<usize> {
        let entry = self.handle_entry(handle)?;
        let count = read_at(entry, handle.offset(), buf)?;
        if count == 0 && !buf.is_empty() {
            return Err(VfsError::EndOfStream);
        }
        handle.advance(count);
        Ok(count)
    }

    fn handle_entry(&self, handle: &FileHandle) -> Result<&FlatEntry> {
        self.cache
            .loaded()
            .filter(|loaded| loaded.generation() == handle.generation())
            .and_then(|loaded| loaded.entry(handle.entry()))
            .ok_or(VfsError::StaleHandle)
    }

    /// Declared size of the entry behind an open handle.
    pub fn handle_size(&mut self, handle: &FileHandle) -> Result<u64> {
        let result = self.handle_entry(handle).map(|entry| entry.unpack_size());
        self.record(result)
    }

    /// Close a handle.
    pub fn close_file(&mut self, handle: FileHandle) {
        debug!(
            "Closing handle on entry {} at offset {}",
            handle.entry().index(),
            handle.offset()
        );
        self.errors.clear();
    }

    /// Extract files to `target_dir`, keeping their in-archive layout.
    ///
    /// Names are host paths through the archive, like every other path. Names
    /// that do not resolve to a file are skipped. An installed abort signal is
    /// checked before every entry and every segment; when raised the current
    /// file is left short, later names are not processed and the report is
    /// marked aborted. The batch itself only fails when `target_dir` exists and
    /// is not a directory.
    pub fn extract_entries<I, P, T>(&mut self, names: I, target_dir: T) -> Result<ExtractReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
        T: AsRef<Path>,
    {
        let result = self.extract_inner(names, target_dir.as_ref());
        self.record(result)
    }

    fn extract_inner<I, P>(&mut self, names: I, target_dir: &Path) -> Result<ExtractReport>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        if target_dir.exists() && !target_dir.is_dir() {
            return Err(VfsError::Io {
                path: target_dir.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::NotADirectory,
                    "extraction target is not a directory",
                ),
            });
        }

        let abort = self.abort.clone();
        let create_directories = self.config.create_directories;
        let mut report = ExtractReport::default();

        info!("Extracting entries to {}", target_dir.display());

        for name in names {
            if should_abort(abort.as_ref()) {
                info!("Extraction aborted before {}", name.as_ref().display());
                report.mark_aborted();
                break;
            }

            let source = sanitize(name.as_ref());
            let located = match self.locate(&source) {
                Ok(located) => located,
                Err(miss) => {
                    debug!("Skipping {}: {:?}", source.display(), miss.skip_reason());
                    report.push(ExtractOutcome::Skipped {
                        source,
                        reason: miss.skip_reason(),
                    });
                    continue;
                }
            };

            let Some(loaded) = self.cache.loaded_mut() else {
                break;
            };
            let Some(entry) = loaded
                .tree()
                .node(located.node)
                .file()
                .and_then(|id| loaded.entry(id))
            else {
                debug!("Skipping {}: not a file", source.display());
                report.push(ExtractOutcome::Skipped {
                    source,
                    reason: SkipReason::NotAFile,
                });
                continue;
            };

            let target = target_dir.join(&located.relative);
            let file = extract_entry(entry, source, target, create_directories, abort.as_ref());

            if !matches!(file.status, FileStatus::WriteFailed(_)) {
                if let Some(node) = loaded.tree_mut().node_mut(located.node) {
                    node.set_extracted_path(file.target.clone());
                }
            }

            let aborted = file.status == FileStatus::Aborted;
            report.push(ExtractOutcome::Written(file));
            if aborted {
                info!("Extraction aborted");
                report.mark_aborted();
                break;
            }
        }

        info!(
            "Extraction finished: {} complete, {} skipped, {} processed",
            report.completed_count(),
            report.skipped_count(),
            report.outcomes().len()
        );
        Ok(report)
    }

    /// Install an abort signal until the returned scope is dropped.
    ///
    /// The previous signal (or none) is restored on drop. Scopes nest.
    pub fn with_abort_signal(&mut self, signal: Option<AbortSignal>) -> AbortScope<'_, C> {
        let previous = std::mem::replace(&mut self.abort, signal);
        AbortScope {
            vfs: self,
            previous,
        }
    }

    /// Currently installed abort signal.
    pub const fn abort_signal(&self) -> Option<&AbortSignal> {
        self.abort.as_ref()
    }

    /// Action for the host when the user activates `path`.
    pub fn context_verb<P: AsRef<Path>>(&mut self, path: P) -> ContextVerb {
        let located = match self.locate(path.as_ref()) {
            Ok(located) => located,
            Err(miss) => {
                self.errors.set(VfsError::from(miss).code());
                return ContextVerb::Fail;
            }
        };
        self.errors.clear();

        let Some(loaded) = self.cache.loaded() else {
            return ContextVerb::Fail;
        };
        let node = loaded.tree().node(located.node);
        match (node.file(), node.extracted_path()) {
            (None, _) => ContextVerb::Default,
            (Some(_), None) => ContextVerb::Extract,
            (Some(_), Some(extracted)) => ContextVerb::Change(extracted.to_path_buf()),
        }
    }

    /// Capabilities reported to the host.
    pub fn properties(&mut self) -> Properties {
        self.errors.clear();
        Properties {
            can_show_subfolders: true,
            extractable: true,
            show_thumbnails: true,
            secure_delete: false,
            trash: false,
            file_hash: false,
            path_completion: false,
            full_rename: false,
            drag_effect: DragEffect::Copy,
            batch_mode: BatchMode::CallForEach,
            copy_buffer_size: self.config.copy_buffer_size,
            disabled_functions: DISABLED_FUNCTIONS,
        }
    }

    /// Free space inside an archive. Loads it, reports zero.
    pub fn disk_space<P: AsRef<Path>>(&mut self, path: P) -> Result<DiskSpace> {
        let result = self
            .cache
            .ensure_loaded(path.as_ref())
            .map(|_| DiskSpace::default());
        self.record(result)
    }

    /// Entry comment. Archives carry none.
    pub fn file_comment<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        let result = self.stat_inner(path.as_ref()).map(|_| String::new());
        self.record(result)
    }

    /// Entry description. Archives carry none.
    pub fn file_description<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        let result = self.stat_inner(path.as_ref()).map(|_| String::new());
        self.record(result)
    }

    fn unsupported<T>(&mut self, operation: &'static str) -> Result<T> {
        debug!("Rejecting {operation} on a read-only archive");
        self.record(Err(VfsError::Unsupported(operation)))
    }

    /// Not supported.
    pub fn write_file(&mut self, _handle: &mut FileHandle, _data: &[u8]) -> Result<usize> {
        self.unsupported("write")
    }

    /// Not supported.
    pub fn create_dir<P: AsRef<Path>>(&mut self, _path: P) -> Result<()> {
        self.unsupported("create directory")
    }

    /// Not supported.
    pub fn rename<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, _from: P, _to: Q) -> Result<()> {
        self.unsupported("rename")
    }

    /// Not supported.
    pub fn set_attributes<P: AsRef<Path>>(
        &mut self,
        _path: P,
        _attributes: FileAttributes,
    ) -> Result<()> {
        self.unsupported("set attributes")
    }

    /// Not supported.
    pub fn set_times<P: AsRef<Path>>(&mut self, _path: P, _modified: SystemTime) -> Result<()> {
        self.unsupported("set times")
    }

    /// Not supported.
    pub fn set_comment<P: AsRef<Path>>(&mut self, _path: P, _comment: &str) -> Result<()> {
        self.unsupported("set comment")
    }

    /// Not supported.
    pub fn delete<P: AsRef<Path>>(&mut self, _path: P) -> Result<()> {
        self.unsupported("delete")
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for Vfs<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("current", &self.current)
            .field("abort", &self.abort)
            .field("errors", &self.errors)
            .finish()
    }
}

/// Abort signal installation scope returned by [`Vfs::with_abort_signal`].
///
/// Dereferences to the [`Vfs`]; restores the previous signal when dropped.
pub struct AbortScope<'a, C> {
    vfs: &'a mut Vfs<C>,
    previous: Option<AbortSignal>,
}

impl<C> Deref for AbortScope<'_, C> {
    type Target = Vfs<C>;

    fn deref(&self) -> &Vfs<C> {
        self.vfs
    }
}

impl<C> DerefMut for AbortScope<'_, C> {
    fn deref_mut(&mut self) -> &mut Vfs<C> {
        self.vfs
    }
}

impl<C> Drop for AbortScope<'_, C> {
    fn drop(&mut self) {
        self.vfs.abort = self.previous.take();
    }
}
