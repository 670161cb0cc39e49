// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Maintain the virtual mount tree and resolve virtual paths.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use log::warn;

use crate::clean_virtual_path;

/// One segment of the virtual tree.
///
/// A node with a non-empty `real_path` binds its whole subtree to that host
/// location; a node with an empty `real_path` is virtual-only and exists to
/// host deeper mappings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountNode {
    name: String,
    real_path: String,
    children: BTreeMap<String, MountNode>,
}

impl MountNode {
    fn new(name: &str, real_path: &str) -> Self {
        Self {
            name: name.to_owned(),
            real_path: real_path.to_owned(),
            children: BTreeMap::new(),
        }
    }

    /// Path segment this node occupies; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host path bound at this node, verbatim; empty for virtual-only nodes.
    #[must_use]
    pub fn real_path(&self) -> &str {
        &self.real_path
    }

    /// Returns true when the node has no direct host backing.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.real_path.is_empty()
    }

    /// Look up a direct child by segment name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&MountNode> {
        self.children.get(name)
    }

    /// Names of the node's children, in sorted order.
    #[must_use]
    pub fn child_names(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    /// The host path this node stands for: its own binding, or the parent's
    /// effective path joined with its name.
    fn effective(&self, parent_effective: &str) -> String {
        if self.real_path.is_empty() {
            join_real(parent_effective, &[self.name.as_str()])
        } else {
            self.real_path.clone()
        }
    }

    fn ensure_descendant(&mut self, rest: &str, real_path: &str, full: &str) {
        let (head, tail) = split_first_segment(rest);
        if tail.is_empty() {
            match self.children.get_mut(head) {
                Some(child) => {
                    if !child.real_path.is_empty() {
                        warn!(
                            "bind map override at {full}: {} replaces {}",
                            real_path, child.real_path
                        );
                    }
                    child.real_path = real_path.to_owned();
                }
                None => {
                    self.children
                        .insert(head.to_owned(), MountNode::new(head, real_path));
                }
            }
        } else {
            let child = self
                .children
                .entry(head.to_owned())
                .or_insert_with(|| MountNode::new(head, ""));
            child.ensure_descendant(tail, real_path, full);
        }
    }
}

/// The rooted prefix tree of bind mappings.
///
/// Built once during bootstrap and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountTree {
    root: MountNode,
}

impl Default for MountTree {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTree {
    /// Create an empty tree whose root is virtual-only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: MountNode::new("", ""),
        }
    }

    /// Insert one mapping from a virtual path to a host path.
    ///
    /// The virtual path is cleaned first. Mapping the root rebinds the root
    /// node itself. Inserting over an existing mapped leaf overrides the
    /// previous binding with a diagnostic; inserting where a virtual-only node
    /// exists promotes it.
    pub fn insert(&mut self, virtual_path: &str, real_path: &str) {
        let cleaned = clean_virtual_path(virtual_path);
        if cleaned.is_empty() {
            if !self.root.real_path.is_empty() {
                warn!(
                    "bind map override at /: {} replaces {}",
                    real_path, self.root.real_path
                );
            }
            self.root.real_path = real_path.to_owned();
            return;
        }
        self.root.ensure_descendant(&cleaned, real_path, virtual_path);
    }

    /// Walk the tree to the node addressed by a virtual path, if one exists.
    ///
    /// The root answers for `/` and the empty path.
    #[must_use]
    pub fn lookup(&self, virtual_path: &str) -> Option<&MountNode> {
        let cleaned = clean_virtual_path(virtual_path);
        let mut node = &self.root;
        if cleaned.is_empty() {
            return Some(node);
        }
        for segment in cleaned.split('/') {
            node = node.child(segment)?;
        }
        Some(node)
    }

    /// Rewrite a virtual path onto the host filesystem.
    ///
    /// Descends while a matching child exists, then splices the first
    /// unmapped segment and the remainder onto the deepest mapping found.
    /// The unmapped root resolves to the empty string.
    #[must_use]
    pub fn resolve(&self, virtual_path: &str) -> String {
        let cleaned = clean_virtual_path(virtual_path);
        let mut node = &self.root;
        let mut effective = node.effective("");
        let mut rest = cleaned.as_str();
        while !rest.is_empty() {
            let (head, tail) = split_first_segment(rest);
            match node.child(head) {
                Some(child) => {
                    effective = child.effective(&effective);
                    node = child;
                    rest = tail;
                }
                None => return join_real(&effective, &[head, tail]),
            }
        }
        effective
    }
}

/// Split off the first `/`-separated segment; the tail may be empty.
fn split_first_segment(path: &str) -> (&str, &str) {
    match path.find('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => (path, ""),
    }
}

/// Join host path fragments, skipping empty parts.
fn join_real(base: &str, parts: &[&str]) -> String {
    let mut out = base.to_owned();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_segments() {
        assert_eq!(split_first_segment("a/b/c"), ("a", "b/c"));
        assert_eq!(split_first_segment("a"), ("a", ""));
        assert_eq!(split_first_segment(""), ("", ""));
    }

    #[test]
    fn join_skips_empty_parts() {
        assert_eq!(join_real("", &["b", ""]), "b");
        assert_eq!(join_real("/tmp/x", &["b", "c/d"]), "/tmp/x/b/c/d");
        assert_eq!(join_real("/data", &["", ""]), "/data");
    }

    #[test]
    fn virtual_interior_inherits_effective_path() {
        let mut tree = MountTree::new();
        tree.insert("/p/q/r", "/data");
        let p = tree.lookup("/p").expect("node p");
        assert!(p.is_virtual());
        assert_eq!(tree.resolve("/p"), "p");
        assert_eq!(tree.resolve("/p/q/other"), "p/q/other");
    }

    #[test]
    fn root_mapping_rebinds_root() {
        let mut tree = MountTree::new();
        tree.insert("/", "/srv/root");
        assert_eq!(tree.resolve("/"), "/srv/root");
        assert_eq!(tree.resolve("/a/b"), "/srv/root/a/b");
    }

    #[test]
    fn promotion_keeps_children() {
        let mut tree = MountTree::new();
        tree.insert("/a/b", "/deep");
        tree.insert("/a", "/shallow");
        assert_eq!(tree.resolve("/a/c"), "/shallow/c");
        assert_eq!(tree.resolve("/a/b/c"), "/deep/c");
    }
}
