//! Directory tree synthesized from an archive's flat entry list.
//!
//! Archives list files only, each under its full path. The tree splits every
//! name into segments and creates the intermediate directory nodes on the
//! way, so directories exist exactly when some file lives beneath them.
//!
//! Nodes live in an arena addressed by [`NodeId`] and refer to entries by
//! [`EntryId`], an index into the loaded archive's entry list. Both indices
//! are only meaningful for the load that produced them.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::FlatEntry;
use crate::path::entry_segments;

/// Index of a node in a [`DirectoryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Index of an entry in the loaded archive's entry list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(usize);

impl EntryId {
    /// Create an id from a position in the entry list.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position in the entry list.
    pub const fn index(self) -> usize {
        self.0
    }
}

/// One file or directory in the tree.
#[derive(Debug, Default)]
pub struct DirectoryNode {
    children: BTreeMap<String, NodeId>,
    file: Option<EntryId>,
    extracted_path: Option<PathBuf>,
}

impl DirectoryNode {
    /// Children by name, in name order.
    pub const fn children(&self) -> &BTreeMap<String, NodeId> {
        &self.children
    }

    /// Child with the given name.
    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.children.get(name).copied()
    }

    /// Entry backing this node, if it is a file.
    pub const fn file(&self) -> Option<EntryId> {
        self.file
    }

    /// Whether the node is a file.
    pub const fn is_file(&self) -> bool {
        self.file.is_some()
    }

    /// Whether the node is a directory.
    pub const fn is_dir(&self) -> bool {
        self.file.is_none()
    }

    /// Host path this entry was last extracted to.
    pub fn extracted_path(&self) -> Option<&Path> {
        self.extracted_path.as_deref()
    }

    /// Remember where this entry was extracted.
    pub fn set_extracted_path(&mut self, path: PathBuf) {
        self.extracted_path = Some(path);
    }
}

/// Hierarchical index over an archive's entries.
#[derive(Debug)]
pub struct DirectoryTree {
    nodes: Vec<DirectoryNode>,
}

impl Default for DirectoryTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirectoryTree {
    /// The root node. Always present.
    pub const ROOT: NodeId = NodeId(0);

    /// Create a tree containing only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![DirectoryNode::default()],
        }
    }

    /// Build the tree for an entry list. `EntryId`s are list positions.
    pub fn build(entries: &[FlatEntry]) -> Self {
        let mut tree = Self::new();
        let mut files = 0usize;

        for (index, entry) in entries.iter().enumerate() {
            if tree.insert(entry.name(), EntryId(index)).is_some() {
                files += 1;
            }
        }

        debug!(
            "Directory tree built: {} entries, {} files, {} nodes",
            entries.len(),
            files,
            tree.nodes.len()
        );
        tree
    }

    /// Insert a file under its full name, creating intermediate directories.
    ///
    /// Returns the file's node, or `None` when the name has no usable segment.
    /// A second insert of the same path replaces the earlier entry.
    pub fn insert(&mut self, name: &str, entry: EntryId) -> Option<NodeId> {
        let mut current = Self::ROOT;
        let mut segments = 0usize;

        for segment in entry_segments(name) {
            current = self.child_or_insert(current, segment);
            segments += 1;
        }

        if segments == 0 {
            warn!("Skipping archive entry with empty name: {name:?}");
            return None;
        }

        let node = &mut self.nodes[current.0];
        if let Some(previous) = node.file.replace(entry) {
            warn!(
                "Duplicate archive path '{name}': entry {} replaces entry {}",
                entry.0, previous.0
            );
        }
        Some(current)
    }

    fn child_or_insert(&mut self, parent: NodeId, name: &str) -> NodeId {
        if let Some(existing) = self.nodes[parent.0].child(name) {
            return existing;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(DirectoryNode::default());
        self.nodes[parent.0].children.insert(name.to_string(), id);
        id
    }

    /// Node by id.
    ///
    /// Ids from another tree are not detected beyond a bounds check; an
    /// out-of-range id resolves to the root.
    pub fn node(&self, id: NodeId) -> &DirectoryNode {
        self.nodes.get(id.0).unwrap_or(&self.nodes[0])
    }

    /// Mutable node by id, `None` when out of range.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut DirectoryNode> {
        self.nodes.get_mut(id.0)
    }

    /// Child of `dir` named `name`.
    pub fn lookup(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        self.nodes.get(dir.0)?.child(name)
    }

    /// Walk from the root along a relative path.
    ///
    /// `.` and the empty path resolve to the root. Root, prefix and parent
    /// components never match.
    pub fn resolve(&self, relative: &Path) -> Option<NodeId> {
        let mut current = Self::ROOT;
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(name) => {
                    current = self.lookup(current, name.to_str()?)?;
                }
                Component::Prefix(_) | Component::RootDir | Component::ParentDir => return None,
            }
        }
        Some(current)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds nothing but the root.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn entries(names: &[&str]) -> Vec<FlatEntry> {
        names
            .iter()
            .map(|name| FlatEntry::new(*name, 0, Vec::new()))
            .collect()
    }

    fn child_names(tree: &DirectoryTree, id: NodeId) -> Vec<(String, bool)> {
        tree.node(id)
            .children()
            .iter()
            .map(|(name, child)| (name.clone(), tree.node(*child).is_file()))
            .collect()
    }

    #[test]
    fn test_empty_archive_has_bare_root() {
        let tree = DirectoryTree::build(&[]);
        assert!(tree.is_empty());
        assert!(tree.node(DirectoryTree::ROOT).is_dir());
        assert_eq!(tree.resolve(Path::new(".")), Some(DirectoryTree::ROOT));
        assert_eq!(tree.resolve(Path::new("")), Some(DirectoryTree::ROOT));
    }

    #[test]
    fn test_directories_are_synthesized() {
        let tree = DirectoryTree::build(&entries(&["a/b.txt", "a/c/d.txt"]));

        let a = tree.resolve(Path::new("a")).expect("a");
        assert_eq!(
            child_names(&tree, a),
            vec![("b.txt".to_string(), true), ("c".to_string(), false)]
        );

        let d = tree.resolve(Path::new("a/c/d.txt")).expect("d");
        assert_eq!(tree.node(d).file(), Some(EntryId::new(1)));
        assert!(tree.resolve(Path::new("a/x")).is_none());
        assert!(tree.resolve(Path::new("/a")).is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let tree = DirectoryTree::build(&entries(&["dup/file", "other", "dup//file"]));
        let node = tree.resolve(Path::new("dup/file")).expect("dup");
        assert_eq!(tree.node(node).file(), Some(EntryId::new(2)));
    }

    #[test]
    fn test_empty_names_are_skipped() {
        let mut tree = DirectoryTree::new();
        assert!(tree.insert("", EntryId::new(0)).is_none());
        assert!(tree.insert("/./", EntryId::new(1)).is_none());
        assert!(tree.node(DirectoryTree::ROOT).is_dir());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_extracted_path_is_recorded() {
        let mut tree = DirectoryTree::build(&entries(&["x/y"]));
        let y = tree.resolve(Path::new("x/y")).expect("y");
        tree.node_mut(y)
            .expect("node")
            .set_extracted_path(PathBuf::from("/tmp/out/x/y"));
        assert_eq!(
            tree.node(y).extracted_path(),
            Some(Path::new("/tmp/out/x/y"))
        );
    }

    proptest! {
        #[test]
        fn every_entry_and_prefix_resolves(
            names in prop::collection::btree_set("[a-c]{1,2}(/[a-c]{1,2}){0,3}", 1..20)
        ) {
            let names: Vec<String> = names.into_iter().collect();
            let flat: Vec<FlatEntry> = names.iter().map(|n| FlatEntry::new(n.clone(), 0, Vec::new())).collect();
            let tree = DirectoryTree::build(&flat);

            for (index, name) in names.iter().enumerate() {
                let node = tree.resolve(Path::new(name));
                prop_assert!(node.is_some());
                let node = tree.node(node.unwrap());

                // A name can be both a file and a prefix of another name; the
                // file slot then belongs to this entry and children coexist.
                prop_assert_eq!(node.file(), Some(EntryId::new(index)));

                let segments: Vec<&str> = name.split('/').collect();
                for depth in 1..segments.len() {
                    let prefix = segments[..depth].join("/");
                    prop_assert!(tree.resolve(Path::new(&prefix)).is_some());
                }
            }
        }
    }
}
