// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: CLI entry point for the bindmapfs mount daemon.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! CLI entry point for the bindmapfs mount daemon.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use bindmapfs::config::load_config;
use bindmapfs::fs::{BindMapFs, FsState};
use bindmapfs::sys;
use bindmapfs::tree::MountTree;
use clap::Parser;
use fuser::MountOption;
use log::info;

/// The distinguished mount option naming the bind map config file.
const CONFIG_OPTION: &str = "bind_map_config=";

#[derive(Debug, Parser)]
#[command(author = "Lukas Bower", version, about = "Bind-map FUSE filesystem")]
struct Cli {
    /// Path to the bind map configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Mount options forwarded to the FUSE session; comma separated,
    /// repeatable. `bind_map_config=<path>` is accepted here for drop-in
    /// compatibility with the historical interface.
    #[arg(short = 'o', value_name = "OPT")]
    options: Vec<String>,

    /// Mount point directory.
    #[arg(value_name = "DIR")]
    mountpoint: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    sys::umask_zero();
    let cli = Cli::parse();
    let (mut options, forwarded_config) = split_mount_options(&cli.options);
    let config_path = cli.config.or(forwarded_config).ok_or_else(|| {
        anyhow!("no bind map configuration; pass --config or -o bind_map_config=<path>")
    })?;
    if !options
        .iter()
        .any(|option| matches!(option, MountOption::FSName(_)))
    {
        options.insert(0, MountOption::FSName("bindmapfs".to_owned()));
    }

    let (ready_tx, ready_rx) = mpsc::channel();
    let bootstrap_thread = thread::spawn(move || {
        let _ = ready_tx.send(bootstrap(&config_path));
    });
    let shim = BindMapFs::new(ready_rx);
    let result = fuser::mount2(shim, &cli.mountpoint, &options)
        .with_context(|| format!("mount {}", cli.mountpoint.display()));
    let _ = bootstrap_thread.join();
    result
}

/// Read the configuration and build the mount tree; the result travels to
/// the shim's `init` as the readiness signal.
fn bootstrap(config_path: &Path) -> Result<FsState> {
    let config = load_config(config_path)?;
    if let Some(root) = &config.root {
        std::env::set_current_dir(root)
            .with_context(|| format!("change directory to root {}", root.display()))?;
    }
    let mut tree = MountTree::new();
    for (virtual_path, real_path) in &config.mounts {
        tree.insert(virtual_path, real_path);
    }
    info!(
        "loaded {} bind mappings from {}",
        config.mounts.len(),
        config_path.display()
    );
    Ok(FsState {
        tree,
        debug: config.debug,
        strict_virtual: config.strict_virtual,
    })
}

/// Split comma-separated `-o` values into fuser mount options, extracting
/// the distinguished config option.
fn split_mount_options(raw: &[String]) -> (Vec<MountOption>, Option<PathBuf>) {
    let mut options = Vec::new();
    let mut config = None;
    for group in raw {
        for option in group.split(',').filter(|option| !option.is_empty()) {
            if let Some(path) = option.strip_prefix(CONFIG_OPTION) {
                config = Some(PathBuf::from(path));
            } else {
                options.push(mount_option(option));
            }
        }
    }
    (options, config)
}

fn mount_option(option: &str) -> MountOption {
    match option {
        "auto_unmount" => MountOption::AutoUnmount,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        other => {
            if let Some(name) = other.strip_prefix("fsname=") {
                MountOption::FSName(name.to_owned())
            } else if let Some(subtype) = other.strip_prefix("subtype=") {
                MountOption::Subtype(subtype.to_owned())
            } else {
                MountOption::CUSTOM(other.to_owned())
            }
        }
    }
}
