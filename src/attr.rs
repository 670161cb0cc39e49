// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Marshal host stat structures into FUSE attributes.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{FileAttr, FileType};

use crate::sys;

/// Attribute cache lifetime handed to the kernel. Zero: the shim never
/// caches, every request re-stats the host.
pub const ATTR_TTL: Duration = Duration::from_secs(0);

/// Mode bits reported for synthesized virtual directories.
pub const VIRTUAL_DIR_PERM: u16 = 0o755;

/// Size reported for synthesized virtual directories.
pub const VIRTUAL_DIR_SIZE: u64 = 4096;

/// Map host mode bits to the FUSE file type.
#[must_use]
pub fn file_type_of_mode(mode: u32) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Marshal a host stat into FUSE attributes under the shim's inode number.
#[must_use]
pub fn stat_to_attr(inode: u64, st: &libc::stat) -> FileAttr {
    FileAttr {
        ino: inode,
        size: st.st_size as u64,
        blocks: st.st_blocks as u64,
        atime: timespec_to_system_time(st.st_atime, st.st_atime_nsec),
        mtime: timespec_to_system_time(st.st_mtime, st.st_mtime_nsec),
        ctime: timespec_to_system_time(st.st_ctime, st.st_ctime_nsec),
        crtime: UNIX_EPOCH,
        kind: file_type_of_mode(st.st_mode as u32),
        perm: (st.st_mode & 0o7777) as u16,
        nlink: st.st_nlink as u32,
        uid: st.st_uid,
        gid: st.st_gid,
        rdev: st.st_rdev as u32,
        blksize: st.st_blksize as u32,
        flags: 0,
    }
}

/// Attributes for a virtual-only directory with no host backing: a 0755
/// directory of size 4096 and link count 2, owned by the serving process,
/// with zero timestamps.
#[must_use]
pub fn synthetic_dir_attr(inode: u64) -> FileAttr {
    FileAttr {
        ino: inode,
        size: VIRTUAL_DIR_SIZE,
        blocks: 0,
        atime: UNIX_EPOCH,
        mtime: UNIX_EPOCH,
        ctime: UNIX_EPOCH,
        crtime: UNIX_EPOCH,
        kind: FileType::Directory,
        perm: VIRTUAL_DIR_PERM,
        nlink: 2,
        uid: sys::euid(),
        gid: sys::egid(),
        rdev: 0,
        blksize: VIRTUAL_DIR_SIZE as u32,
        flags: 0,
    }
}

fn timespec_to_system_time(sec: i64, nsec: i64) -> SystemTime {
    let nanos = nsec.clamp(0, 999_999_999) as u32;
    if sec >= 0 {
        UNIX_EPOCH + Duration::new(sec as u64, nanos)
    } else {
        UNIX_EPOCH - Duration::new(sec.unsigned_abs(), 0) + Duration::new(0, nanos)
    }
}
