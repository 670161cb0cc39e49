// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate bind map tree construction and path resolution.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use bindmapfs::tree::MountTree;

fn tree_of(mounts: &[(&str, &str)]) -> MountTree {
    let mut tree = MountTree::new();
    for (virtual_path, real_path) in mounts {
        tree.insert(virtual_path, real_path);
    }
    tree
}

#[test]
fn simple_bind_rewrites_the_prefix() {
    let tree = tree_of(&[("/a", "/tmp/x")]);
    assert_eq!(tree.resolve("/a"), "/tmp/x");
    assert_eq!(tree.resolve("/a/b/c"), "/tmp/x/b/c");
    // Unmapped paths fall through to the CWD anchor.
    assert_eq!(tree.resolve("/b"), "b");
}

#[test]
fn unmapped_root_resolves_to_the_empty_anchor() {
    let tree = tree_of(&[("/a", "/tmp/x")]);
    assert_eq!(tree.resolve("/"), "");
    assert_eq!(tree.resolve(""), "");
}

#[test]
fn virtual_interior_directories_are_synthesized() {
    let tree = tree_of(&[("/p/q/r", "/data")]);
    let root = tree.lookup("/").expect("root");
    assert_eq!(root.child_names(), vec!["p".to_owned()]);
    let p = tree.lookup("/p").expect("p");
    assert!(p.is_virtual());
    assert_eq!(p.child_names(), vec!["q".to_owned()]);
    let q = tree.lookup("/p/q").expect("q");
    assert_eq!(q.child_names(), vec!["r".to_owned()]);
    let r = tree.lookup("/p/q/r").expect("r");
    assert!(!r.is_virtual());
    assert_eq!(tree.resolve("/p/q/r/file"), "/data/file");
}

#[test]
fn longest_prefix_wins() {
    let tree = tree_of(&[("/a", "/x"), ("/a/b", "/y")]);
    assert_eq!(tree.resolve("/a/b/c"), "/y/c");
    assert_eq!(tree.resolve("/a/c"), "/x/c");
    assert_eq!(tree.resolve("/a/b"), "/y");
}

#[test]
fn deeper_descendants_of_virtual_nodes_fall_through() {
    let tree = tree_of(&[("/p/q/r", "/data")]);
    // /p/other never reaches a mapping: it resolves under the root anchor.
    assert_eq!(tree.resolve("/p/other"), "p/other");
    assert_eq!(tree.resolve("/p/q/other/deep"), "p/q/other/deep");
}

#[test]
fn override_replaces_only_the_target_leaf() {
    let tree = tree_of(&[("/a", "/x"), ("/a/b", "/y"), ("/a", "/z")]);
    assert_eq!(tree.resolve("/a"), "/z");
    assert_eq!(tree.resolve("/a/c"), "/z/c");
    // The sibling mapping is untouched.
    assert_eq!(tree.resolve("/a/b/c"), "/y/c");
}

#[test]
fn every_mapping_resolves_to_itself() {
    let mounts = [
        ("/a", "/tmp/x"),
        ("/a/b", "/y"),
        ("/p/q/r", "/data"),
        ("/solo", "rel/anchor"),
    ];
    let mut tree = tree_of(&mounts);
    for (virtual_path, real_path) in &mounts {
        assert_eq!(tree.resolve(virtual_path), *real_path);
    }
    // Re-inserting the same mapping set changes nothing.
    for (virtual_path, real_path) in &mounts {
        tree.insert(virtual_path, real_path);
    }
    for (virtual_path, real_path) in &mounts {
        assert_eq!(tree.resolve(virtual_path), *real_path);
    }
}

#[test]
fn leading_separator_and_dot_segments_are_cleaned() {
    let tree = tree_of(&[("a//b/./", "/x")]);
    assert_eq!(tree.resolve("/a/b"), "/x");
    assert_eq!(tree.resolve("a/b/c/../d"), "/x/d");
}

#[test]
fn lookup_misses_are_distinct_from_virtual_nodes() {
    let tree = tree_of(&[("/p/q", "/data")]);
    assert!(tree.lookup("/p").is_some());
    assert!(tree.lookup("/p/q").is_some());
    assert!(tree.lookup("/p/x").is_none());
    assert!(tree.lookup("/x").is_none());
}
