// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Validate bind map configuration loading.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use bindmapfs::config::{load_config, parse_config};
use tempfile::tempdir;

#[test]
fn loads_a_config_file_from_disk() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bindmap.yaml");
    fs::write(
        &path,
        "mounts:\n  /a: /tmp/x\n  /p/q/r: /data\nroot: /srv/anchor\n",
    )
    .expect("write config");
    let config = load_config(&path).expect("load");
    assert_eq!(config.mounts.len(), 2);
    assert_eq!(config.root, Some(PathBuf::from("/srv/anchor")));
    assert!(!config.debug);
    assert!(!config.strict_virtual);
}

#[test]
fn missing_file_is_a_startup_error() {
    let dir = tempdir().expect("tempdir");
    let err = load_config(&dir.path().join("absent.yaml")).expect_err("must fail");
    assert!(err.to_string().contains("failed to read bind map config"));
}

#[test]
fn undecodable_text_is_a_startup_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("bad.yaml");
    fs::write(&path, "mounts: [not, a, mapping]\n").expect("write config");
    assert!(load_config(&path).is_err());
}

#[test]
fn flags_decode_and_default_off() {
    let config =
        parse_config("mounts:\n  /a: /x\ndebug: true\nstrict_virtual: true\n").expect("parse");
    assert!(config.debug);
    assert!(config.strict_virtual);
    let config = parse_config("mounts:\n  /a: /x\n").expect("parse");
    assert!(!config.debug);
    assert!(!config.strict_virtual);
}

#[test]
fn empty_mounts_mapping_is_allowed() {
    let config = parse_config("mounts: {}\n").expect("parse");
    assert!(config.mounts.is_empty());
}

#[test]
fn json_is_valid_yaml_input() {
    let config =
        parse_config("{\"mounts\": {\"/a\": \"/tmp/x\"}, \"debug\": true}").expect("parse");
    assert_eq!(config.mounts.get("/a").map(String::as_str), Some("/tmp/x"));
    assert!(config.debug);
}
