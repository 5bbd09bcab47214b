//! Path normalization shared by every lookup.
//!
//! Host paths and in-archive names both pass through here before they are
//! compared. Parent-directory (`..`) components are dropped rather than
//! applied, so no input can climb out of an archive or out of the directory
//! that holds the archive file.

use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Path used for "the archive root itself".
pub const CURRENT_DIR: &str = ".";

/// Normalize an externally supplied path.
///
/// - backslashes count as separators on every host
/// - repeated separators and `.` components are removed
/// - `..` components are discarded
/// - root and prefix components are kept
/// - an empty result becomes `.`
pub fn sanitize<P: AsRef<Path>>(path: P) -> PathBuf {
    let unified = unify_separators(path.as_ref());
    let mut result = PathBuf::new();

    for component in unified.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                result.push(component);
            }
            Component::CurDir | Component::ParentDir => {}
        }
    }

    if result.as_os_str().is_empty() {
        PathBuf::from(CURRENT_DIR)
    } else {
        result
    }
}

fn unify_separators(path: &Path) -> Cow<'_, Path> {
    if std::path::MAIN_SEPARATOR == '\\' {
        return Cow::Borrowed(path);
    }
    match path.to_str() {
        Some(s) if s.contains('\\') => Cow::Owned(PathBuf::from(s.replace('\\', "/"))),
        _ => Cow::Borrowed(path),
    }
}

/// Whether `path` equals `base` or lies beneath it (component-wise).
pub fn is_subpath(base: &Path, path: &Path) -> bool {
    !base.as_os_str().is_empty() && path.starts_with(base)
}

/// `path` relative to `base`, `.` when they are equal.
pub fn relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    let stripped = path.strip_prefix(base).ok()?;
    if stripped.as_os_str().is_empty() {
        Some(PathBuf::from(CURRENT_DIR))
    } else {
        Some(stripped.to_path_buf())
    }
}

/// Whether the path is the `.` no-op path.
pub fn is_current_dir(path: &Path) -> bool {
    path.as_os_str().is_empty() || path == Path::new(CURRENT_DIR)
}

/// Case-insensitive extension check. `extension` is given without the dot.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.to_lowercase() == extension.to_lowercase())
}

/// Split an in-archive entry name into tree segments.
///
/// Both separators are accepted; empty, `.` and `..` segments are skipped.
pub fn entry_segments(name: &str) -> impl Iterator<Item = &str> {
    name.split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_collapses_and_drops_traversal() {
        assert_eq!(
            sanitize("/data//disk.lzx/./a/../b"),
            PathBuf::from("/data/disk.lzx/a/b")
        );
        assert_eq!(sanitize("../../etc/passwd"), PathBuf::from("etc/passwd"));
        assert_eq!(sanitize(""), PathBuf::from("."));
        assert_eq!(sanitize("./.."), PathBuf::from("."));
        assert_eq!(sanitize("/"), PathBuf::from("/"));
    }

    #[cfg(unix)]
    #[test]
    fn test_sanitize_backslashes() {
        assert_eq!(
            sanitize("/data/disk.lzx\\dir\\file.txt"),
            PathBuf::from("/data/disk.lzx/dir/file.txt")
        );
    }

    #[test]
    fn test_is_subpath_component_wise() {
        let base = Path::new("/data/disk.lzx");
        assert!(is_subpath(base, Path::new("/data/disk.lzx")));
        assert!(is_subpath(base, Path::new("/data/disk.lzx/a/b")));
        assert!(!is_subpath(base, Path::new("/data/disk.lzx2/a")));
        assert!(!is_subpath(Path::new(""), Path::new("/data")));
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/data/disk.lzx");
        assert_eq!(
            relative_to(Path::new("/data/disk.lzx"), base),
            Some(PathBuf::from("."))
        );
        assert_eq!(
            relative_to(Path::new("/data/disk.lzx/a/b"), base),
            Some(PathBuf::from("a/b"))
        );
        assert_eq!(relative_to(Path::new("/other"), base), None);
    }

    #[test]
    fn test_has_extension_ignores_case() {
        assert!(has_extension(Path::new("/x/DISK.LZX"), "lzx"));
        assert!(has_extension(Path::new("/x/disk.Lzx"), "LZX"));
        assert!(!has_extension(Path::new("/x/disk.lha"), "lzx"));
        assert!(!has_extension(Path::new("/x/lzx"), "lzx"));
    }

    #[test]
    fn test_entry_segments() {
        let segments: Vec<_> = entry_segments("a//b/./c\\d/../e").collect();
        assert_eq!(segments, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(entry_segments("").count(), 0);
    }

    proptest! {
        #[test]
        fn sanitize_never_yields_parent_components(
            parts in prop::collection::vec(
                prop_oneof![
                    Just("..".to_string()),
                    Just(".".to_string()),
                    Just(String::new()),
                    "[a-z]{1,6}",
                ],
                0..12,
            )
        ) {
            let joined = parts.join("/");
            let sanitized = sanitize(&joined);
            prop_assert!(!sanitized.components().any(|c| c == Component::ParentDir));
            prop_assert_eq!(sanitize(&sanitized), sanitized);
        }
    }
}
