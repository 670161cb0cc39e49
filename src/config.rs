// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Load and validate bind map configuration files.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

/// Decoded bind map configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindMapConfig {
    /// Virtual path (inside the mount point) to host path mappings.
    pub mounts: BTreeMap<String, String>,
    /// Log per-request resolution decisions when set.
    pub debug: bool,
    /// Historical: change directory here before serving, anchoring all
    /// relative effective paths.
    pub root: Option<PathBuf>,
    /// Suppress real-entry merging when listing virtual-only directories.
    pub strict_virtual: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigYaml {
    #[serde(default)]
    mounts: BTreeMap<String, String>,
    #[serde(default)]
    debug: bool,
    root: Option<String>,
    #[serde(default)]
    strict_virtual: bool,
}

/// Load and validate a bind map configuration from disk.
pub fn load_config(path: &Path) -> Result<BindMapConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read bind map config {}", path.display()))?;
    parse_config(&text)
        .with_context(|| format!("invalid bind map config {}", path.display()))
}

/// Decode a bind map configuration from YAML text.
pub fn parse_config(text: &str) -> Result<BindMapConfig> {
    let parsed: ConfigYaml =
        serde_yaml::from_str(text).context("config is not a YAML mapping")?;
    let config = BindMapConfig {
        mounts: parsed.mounts,
        debug: parsed.debug,
        root: parsed.root.map(PathBuf::from),
        strict_virtual: parsed.strict_virtual,
    };
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &BindMapConfig) -> Result<()> {
    for (virtual_path, real_path) in &config.mounts {
        if real_path.is_empty() {
            return Err(anyhow!("mount {virtual_path} has an empty real path"));
        }
        if virtual_path.as_bytes().iter().any(|byte| *byte == 0)
            || real_path.as_bytes().iter().any(|byte| *byte == 0)
        {
            return Err(anyhow!("mount {virtual_path} contains a NUL byte"));
        }
    }
    if let Some(root) = &config.root {
        if !root.is_absolute() {
            return Err(anyhow!("root {} must be absolute", root.display()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mounts_and_flags() {
        let config = parse_config(
            "mounts:\n  /a: /tmp/x\n  /p/q/r: /data\ndebug: true\n",
        )
        .expect("parse");
        assert_eq!(config.mounts.get("/a").map(String::as_str), Some("/tmp/x"));
        assert_eq!(
            config.mounts.get("/p/q/r").map(String::as_str),
            Some("/data")
        );
        assert!(config.debug);
        assert!(!config.strict_virtual);
        assert!(config.root.is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse_config("mounts: {}\nbogus: 1\n").is_err());
    }

    #[test]
    fn rejects_empty_real_path() {
        assert!(parse_config("mounts:\n  /a: \"\"\n").is_err());
    }

    #[test]
    fn rejects_relative_root() {
        assert!(parse_config("mounts: {}\nroot: srv/anchor\n").is_err());
    }
}
