// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Map FUSE inode numbers onto virtual paths.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::HashMap;

/// The inode number the kernel uses for the mount root.
pub const ROOT_INODE: u64 = 1;

/// Bidirectional inode/path table.
///
/// The kernel addresses files by the inode numbers this table issues; the
/// shim recovers the virtual path per request. Numbers are synthetic
/// counters, never host inodes, so mappings onto different host filesystems
/// cannot collide.
#[derive(Debug)]
pub struct InodeTable {
    by_inode: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Create a table seeded with the root mapping.
    #[must_use]
    pub fn new() -> Self {
        let mut table = Self {
            by_inode: HashMap::new(),
            by_path: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.insert("/");
        table
    }

    /// Return the inode for a virtual path, issuing one if needed.
    pub fn insert(&mut self, path: &str) -> u64 {
        if let Some(existing) = self.by_path.get(path) {
            return *existing;
        }
        let inode = if path == "/" {
            ROOT_INODE
        } else {
            let issued = self.next_inode;
            self.next_inode = self.next_inode.saturating_add(1);
            issued
        };
        self.by_inode.insert(inode, path.to_owned());
        self.by_path.insert(path.to_owned(), inode);
        inode
    }

    /// Virtual path registered for an inode.
    #[must_use]
    pub fn path_of(&self, inode: u64) -> Option<&str> {
        self.by_inode.get(&inode).map(String::as_str)
    }

    /// Drop the registration for a virtual path after unlink or rename.
    pub fn remove(&mut self, path: &str) {
        if let Some(inode) = self.by_path.remove(path) {
            self.by_inode.remove(&inode);
        }
    }

    /// Move a registration to a new path, keeping its inode number, so
    /// handles the kernel already holds stay valid across a rename.
    pub fn rekey(&mut self, old_path: &str, new_path: &str) {
        self.remove(new_path);
        if let Some(inode) = self.by_path.remove(old_path) {
            self.by_inode.insert(inode, new_path.to_owned());
            self.by_path.insert(new_path.to_owned(), inode);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_inode_one() {
        let mut table = InodeTable::new();
        assert_eq!(table.insert("/"), ROOT_INODE);
        assert_eq!(table.path_of(ROOT_INODE), Some("/"));
    }

    #[test]
    fn insert_is_idempotent() {
        let mut table = InodeTable::new();
        let a = table.insert("/a");
        assert_eq!(table.insert("/a"), a);
        let b = table.insert("/b");
        assert_ne!(a, b);
    }

    #[test]
    fn remove_frees_the_path() {
        let mut table = InodeTable::new();
        let a = table.insert("/a");
        table.remove("/a");
        assert_eq!(table.path_of(a), None);
        assert_ne!(table.insert("/a"), a);
    }

    #[test]
    fn rekey_keeps_the_inode_number() {
        let mut table = InodeTable::new();
        let a = table.insert("/a");
        let b = table.insert("/b");
        table.rekey("/a", "/b");
        assert_eq!(table.path_of(a), Some("/b"));
        assert_eq!(table.path_of(b), None);
        assert_eq!(table.insert("/b"), a);
    }
}
