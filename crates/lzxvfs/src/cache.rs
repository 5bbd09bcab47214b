//! Single-slot archive cache.
//!
//! Hosts navigate by handing in host paths that run through an archive file.
//! The cache keeps the most recently opened archive and serves every path
//! beneath its location without touching the codec again. Asking for a path
//! anywhere else discards the archive and locates a new one by walking up the
//! requested path until an existing file turns up.

use std::path::{Path, PathBuf};

use tracing::{debug, info, trace, warn};

use crate::codec::{ArchiveCodec, ArchiveHandle, FlatEntry};
use crate::path::{has_extension, is_subpath, relative_to, sanitize};
use crate::tree::{DirectoryTree, EntryId};
use crate::{Result, VfsError};

/// The archive currently served by an [`ArchiveCache`].
pub struct LoadedArchive {
    path: PathBuf,
    entries: Vec<FlatEntry>,
    tree: DirectoryTree,
    generation: u64,
    // Segments may borrow codec state owned by the handle; drop it last.
    _handle: Box<dyn ArchiveHandle>,
}

impl LoadedArchive {
    /// Host path of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries in codec order.
    pub fn entries(&self) -> &[FlatEntry] {
        &self.entries
    }

    /// Entry by id.
    pub fn entry(&self, id: EntryId) -> Option<&FlatEntry> {
        self.entries.get(id.index())
    }

    /// Directory tree built for this load.
    pub const fn tree(&self) -> &DirectoryTree {
        &self.tree
    }

    /// Mutable directory tree (extraction bookkeeping).
    pub fn tree_mut(&mut self) -> &mut DirectoryTree {
        &mut self.tree
    }

    /// Load generation this archive was opened in.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// `path` relative to the archive file, `None` when outside it.
    pub fn relative(&self, path: &Path) -> Option<PathBuf> {
        relative_to(path, &self.path)
    }
}

impl std::fmt::Debug for LoadedArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedArchive")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("nodes", &self.tree.len())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Owns the codec and at most one open archive.
pub struct ArchiveCache<C> {
    codec: C,
    extension: String,
    loaded: Option<LoadedArchive>,
    generation: u64,
}

impl<C: ArchiveCodec> ArchiveCache<C> {
    /// Create an empty cache handling files with the given extension.
    pub fn new(codec: C, extension: &str) -> Self {
        Self {
            codec,
            extension: extension.trim_start_matches('.').to_string(),
            loaded: None,
            generation: 0,
        }
    }

    /// The codec used to open archives.
    pub const fn codec(&self) -> &C {
        &self.codec
    }

    /// Container extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The archive currently loaded.
    pub const fn loaded(&self) -> Option<&LoadedArchive> {
        self.loaded.as_ref()
    }

    /// Mutable access to the archive currently loaded.
    pub fn loaded_mut(&mut self) -> Option<&mut LoadedArchive> {
        self.loaded.as_mut()
    }

    /// Number of successful loads so far. Bumped on every new archive.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop the loaded archive, if any.
    pub fn unload(&mut self) {
        if let Some(previous) = self.loaded.take() {
            debug!("Discarding archive {}", previous.path.display());
        }
    }

    /// Make sure the archive containing `path` is loaded.
    ///
    /// Returns `path` relative to the archive file (`.` for the archive
    /// itself). Paths under the already loaded archive never reach the codec.
    pub fn ensure_loaded(&mut self, path: &Path) -> Result<PathBuf> {
        let path = sanitize(path);

        if let Some(relative) = self
            .loaded
            .as_ref()
            .filter(|loaded| is_subpath(&loaded.path, &path))
            .and_then(|loaded| loaded.relative(&path))
        {
            trace!("Archive cache hit for {}", path.display());
            return Ok(relative);
        }

        self.unload();

        let Some(file) = locate_archive(&path) else {
            debug!("No archive file along {}", path.display());
            return Err(VfsError::NotFound(path));
        };

        if !has_extension(&file, &self.extension) {
            debug!(
                "{} does not have the .{} extension",
                file.display(),
                self.extension
            );
            return Err(VfsError::NotFound(path));
        }

        let handle = match self.codec.open(&file) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to open archive {}: {e}", file.display());
                return Err(VfsError::NotFound(path));
            }
        };

        let entries = match handle.list_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list archive {}: {e}", file.display());
                return Err(VfsError::NotFound(path));
            }
        };

        self.generation += 1;
        let tree = DirectoryTree::build(&entries);
        info!(
            "Loaded archive {}: {} entries, {} tree nodes",
            file.display(),
            entries.len(),
            tree.len()
        );

        let relative = relative_to(&path, &file).unwrap_or_else(|| PathBuf::from("."));
        self.loaded = Some(LoadedArchive {
            path: file,
            entries,
            tree,
            generation: self.generation,
            _handle: handle,
        });
        Ok(relative)
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for ArchiveCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveCache")
            .field("codec", &self.codec)
            .field("extension", &self.extension)
            .field("loaded", &self.loaded)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Nearest existing ancestor of `path` (itself included), if it is a file.
fn locate_archive(path: &Path) -> Option<PathBuf> {
    let existing = path
        .ancestors()
        .filter(|candidate| !candidate.as_os_str().is_empty())
        .find(|candidate| candidate.exists())?;
    existing.is_file().then(|| existing.to_path_buf())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::memory::{MemoryArchive, MemoryCodec};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        first: PathBuf,
        second: PathBuf,
    }

    fn fixture() -> (Fixture, MemoryCodec) {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("first.lzx");
        let second = dir.path().join("SECOND.LZX");
        std::fs::write(&first, b"").expect("write");
        std::fs::write(&second, b"").expect("write");

        let codec = MemoryCodec::new()
            .with_archive(
                &first,
                MemoryArchive::new()
                    .with_file("a/b.txt", b"0123456789")
                    .expect("archive")
                    .with_file("a/c/d.txt", b"")
                    .expect("archive"),
            )
            .with_archive(
                &second,
                MemoryArchive::new()
                    .with_file("readme", b"hi")
                    .expect("archive"),
            );

        (
            Fixture {
                _dir: dir,
                first,
                second,
            },
            codec,
        )
    }

    #[test]
    fn test_navigation_within_archive_does_not_reopen() {
        let (fx, codec) = fixture();
        let mut cache = ArchiveCache::new(codec.clone(), "lzx");

        let rel = cache.ensure_loaded(&fx.first).expect("load");
        assert_eq!(rel, PathBuf::from("."));
        let rel = cache.ensure_loaded(&fx.first.join("a")).expect("a");
        assert_eq!(rel, PathBuf::from("a"));
        let rel = cache.ensure_loaded(&fx.first.join("a/c/d.txt")).expect("d");
        assert_eq!(rel, PathBuf::from("a/c/d.txt"));
        let rel = cache.ensure_loaded(&fx.first.join("missing/x")).expect("x");
        assert_eq!(rel, PathBuf::from("missing/x"));

        assert_eq!(codec.open_count(), 1);
        assert_eq!(cache.generation(), 1);
    }

    #[test]
    fn test_crossing_archives_reopens() {
        let (fx, codec) = fixture();
        let mut cache = ArchiveCache::new(codec.clone(), "lzx");

        cache.ensure_loaded(&fx.first.join("a")).expect("first");
        cache.ensure_loaded(&fx.second.join("readme")).expect("second");
        assert_eq!(codec.open_count(), 2);
        assert_eq!(
            cache.loaded().map(LoadedArchive::path),
            Some(fx.second.as_path())
        );

        cache.ensure_loaded(&fx.first).expect("first again");
        assert_eq!(codec.open_count(), 3);
        assert_eq!(cache.generation(), 3);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let (fx, codec) = fixture();
        let mut cache = ArchiveCache::new(codec, "lzx");
        cache.ensure_loaded(&fx.first).expect("first");

        let missing = fx.first.with_file_name("absent.lzx").join("x");
        assert!(matches!(
            cache.ensure_loaded(&missing),
            Err(VfsError::NotFound(_))
        ));
        assert!(cache.loaded().is_none());
    }

    #[test]
    fn test_wrong_extension_is_not_found() {
        let (fx, codec) = fixture();
        let other = fx.first.with_file_name("notes.txt");
        std::fs::write(&other, b"text").expect("write");

        let mut cache = ArchiveCache::new(codec.clone(), "lzx");
        assert!(matches!(
            cache.ensure_loaded(&other.join("inner")),
            Err(VfsError::NotFound(_))
        ));
        assert_eq!(codec.open_count(), 0);
    }

    #[test]
    fn test_directory_is_not_an_archive() {
        let (fx, codec) = fixture();
        let dir = fx.first.with_file_name("folder.lzx");
        std::fs::create_dir(&dir).expect("mkdir");

        let mut cache = ArchiveCache::new(codec.clone(), "lzx");
        assert!(cache.ensure_loaded(&dir.join("a")).is_err());
        assert_eq!(codec.open_count(), 0);
    }

    #[test]
    fn test_codec_failure_leaves_nothing_loaded() {
        let (fx, codec) = fixture();
        let unregistered = fx.first.with_file_name("broken.lzx");
        std::fs::write(&unregistered, b"garbage").expect("write");

        let mut cache = ArchiveCache::new(codec.clone(), ".lzx");
        assert!(matches!(
            cache.ensure_loaded(&unregistered),
            Err(VfsError::NotFound(_))
        ));
        assert!(cache.loaded().is_none());
        assert_eq!(cache.generation(), 0);
        assert_eq!(codec.open_count(), 1);
    }

    #[test]
    fn test_traversal_cannot_leave_archive() {
        let (fx, codec) = fixture();
        let mut cache = ArchiveCache::new(codec.clone(), "lzx");

        let sneaky = fx.first.join("a/../../..");
        let rel = cache.ensure_loaded(&sneaky).expect("load");
        assert_eq!(rel, PathBuf::from("a"));
        assert_eq!(codec.open_count(), 1);
    }
}
