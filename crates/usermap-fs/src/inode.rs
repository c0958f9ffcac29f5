//! Kernel node identifiers.
//!
//! The kernel addresses nodes by number while the translator works on
//! paths. The table hands out a number per path on lookup and keeps it
//! until the kernel forgets every reference. Nothing else about the node
//! is remembered.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Number of the served root.
pub const ROOT_INO: u64 = fuser::FUSE_ROOT_ID;

#[derive(Debug)]
struct Node {
    path: PathBuf,
    lookups: u64,
}

/// Bidirectional map between kernel node numbers and served paths.
#[derive(Debug)]
pub struct InodeTable {
    nodes: HashMap<u64, Node>,
    by_path: HashMap<PathBuf, u64>,
    next: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Creates a table holding only the root, which is never forgotten.
    #[must_use]
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut nodes = HashMap::new();
        let _ = nodes.insert(
            ROOT_INO,
            Node {
                path: root.clone(),
                lookups: 1,
            },
        );
        let mut by_path = HashMap::new();
        let _ = by_path.insert(root, ROOT_INO);
        Self {
            nodes,
            by_path,
            next: ROOT_INO + 1,
        }
    }

    /// Path currently bound to `ino`.
    #[must_use]
    pub fn path(&self, ino: u64) -> Option<&Path> {
        self.nodes.get(&ino).map(|node| node.path.as_path())
    }

    /// Path of `name` inside the directory bound to `parent`.
    #[must_use]
    pub fn child(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|dir| dir.join(name))
    }

    /// Binds `path` to a number and records one kernel reference.
    pub fn lookup(&mut self, path: &Path) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.lookups += 1;
            }
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        let _ = self.nodes.insert(
            ino,
            Node {
                path: path.to_path_buf(),
                lookups: 1,
            },
        );
        let _ = self.by_path.insert(path.to_path_buf(), ino);
        ino
    }

    /// Drops `count` kernel references; the number is released at zero.
    pub fn forget(&mut self, ino: u64, count: u64) {
        if ino == ROOT_INO {
            return;
        }
        let Some(node) = self.nodes.get_mut(&ino) else {
            return;
        };
        node.lookups = node.lookups.saturating_sub(count);
        if node.lookups > 0 {
            return;
        }
        if let Some(node) = self.nodes.remove(&ino) {
            if self.by_path.get(&node.path) == Some(&ino) {
                let _ = self.by_path.remove(&node.path);
            }
        }
    }

    /// Unbinds `path` after it was removed. A number the kernel still
    /// holds keeps its old path until forgotten.
    pub fn unlink(&mut self, path: &Path) {
        let _ = self.by_path.remove(path);
    }

    /// Moves `from`, and everything below it, to `to`.
    pub fn rename(&mut self, from: &Path, to: &Path) {
        self.unlink(to);
        let moved: Vec<(PathBuf, u64)> = self
            .by_path
            .iter()
            .filter(|(path, _)| path.starts_with(from))
            .map(|(path, &ino)| (path.clone(), ino))
            .collect();
        for (old, ino) in moved {
            let _ = self.by_path.remove(&old);
            let new = match old.strip_prefix(from) {
                Ok(rest) if !rest.as_os_str().is_empty() => to.join(rest),
                _ => to.to_path_buf(),
            };
            if let Some(node) = self.nodes.get_mut(&ino) {
                node.path.clone_from(&new);
            }
            let _ = self.by_path.insert(new, ino);
        }
    }

    /// Number of bound nodes, the root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false; the root is permanent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
