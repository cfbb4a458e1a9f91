use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    path::{Component, Path, PathBuf},
};

use crate::paths::file_name_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    Directory,
    Page,
    Image,
}

/// The vault's directory structure. Directories list their children directories first, then by
/// case-insensitive name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileNode {
    pub name: String,
    pub path: PathBuf,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FileNode>,
}

fn child_order(a: &FileNode, b: &FileNode) -> Ordering {
    let a_dir = a.kind == NodeKind::Directory;
    let b_dir = b.kind == NodeKind::Directory;
    b_dir
        .cmp(&a_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

impl FileNode {
    pub fn new(path: &Path, kind: NodeKind) -> FileNode {
        FileNode {
            name: file_name_string(path),
            path: path.to_path_buf(),
            kind,
            children: Vec::new(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    fn relative_names<'p>(&self, path: &'p Path) -> Option<Vec<&'p std::ffi::OsStr>> {
        let rel = path.strip_prefix(&self.path).ok()?;
        Some(
            rel.components()
                .filter_map(|c| match c {
                    Component::Normal(name) => Some(name),
                    _ => None,
                })
                .collect(),
        )
    }

    fn child_index(&self, name: &std::ffi::OsStr) -> Option<usize> {
        self.children
            .iter()
            .position(|c| c.path.file_name() == Some(name))
    }

    /// Insert `path` below this directory, creating missing intermediate directories. An
    /// existing node keeps its children and takes the new kind. Returns false when `path` is not
    /// below this node.
    pub fn insert(&mut self, path: &Path, kind: NodeKind) -> bool {
        let Some(names) = self.relative_names(path) else {
            return false;
        };
        if names.is_empty() {
            return false;
        }
        let mut node = self;
        let last = names.len() - 1;
        for (depth, name) in names.into_iter().enumerate() {
            let child_kind = if depth == last {
                kind
            } else {
                NodeKind::Directory
            };
            let idx = match node.child_index(name) {
                Some(idx) => {
                    if depth == last {
                        node.children[idx].kind = kind;
                        if kind != NodeKind::Directory {
                            node.children[idx].children.clear();
                        }
                    }
                    idx
                }
                None => {
                    let child = FileNode::new(&node.path.join(name), child_kind);
                    let pos = node
                        .children
                        .binary_search_by(|probe| child_order(probe, &child))
                        .unwrap_or_else(|pos| pos);
                    node.children.insert(pos, child);
                    pos
                }
            };
            node = &mut node.children[idx];
        }
        true
    }

    /// Remove the node at `path` and everything under it.
    pub fn remove(&mut self, path: &Path) -> Option<FileNode> {
        let names = self.relative_names(path)?;
        let (last, parents) = names.split_last()?;
        let mut node = self;
        for name in parents {
            let idx = node.child_index(name)?;
            node = &mut node.children[idx];
        }
        let idx = node.child_index(last)?;
        Some(node.children.remove(idx))
    }

    pub fn find(&self, path: &Path) -> Option<&FileNode> {
        let names = self.relative_names(path)?;
        let mut node = self;
        for name in names {
            let idx = node.child_index(name)?;
            node = &node.children[idx];
        }
        Some(node)
    }

    /// Every directory path in the tree, this node included, in depth-first order.
    pub fn directory_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.collect_dirs(&mut out);
        out
    }

    fn collect_dirs(&self, out: &mut Vec<PathBuf>) {
        if self.is_dir() {
            out.push(self.path.clone());
            self.children.iter().for_each(|c| c.collect_dirs(out));
        }
    }

    /// Paths of every node of `kind` under this node.
    pub fn paths_of(&self, kind: NodeKind) -> Vec<PathBuf> {
        let mut out = Vec::new();
        self.collect_kind(kind, &mut out);
        out
    }

    fn collect_kind(&self, kind: NodeKind, out: &mut Vec<PathBuf>) {
        if self.kind == kind {
            out.push(self.path.clone());
        }
        self.children
            .iter()
            .for_each(|c| c.collect_kind(kind, out));
    }

    /// True when every directory's children are in display order.
    pub fn is_sorted(&self) -> bool {
        self.children
            .windows(2)
            .all(|w| child_order(&w[0], &w[1]) != Ordering::Greater)
            && self.children.iter().all(|c| c.is_sorted())
    }
}
