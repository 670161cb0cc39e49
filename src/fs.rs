// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Implement the FUSE operation shim over the mount tree.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use fuser::{
    FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use log::{debug, error, info};

use crate::attr::{self, ATTR_TTL};
use crate::creds::CredScope;
use crate::inode::InodeTable;
use crate::sys;
use crate::trace::TraceFilter;
use crate::tree::MountTree;
use crate::{host_path, NO_HANDLE};

/// Filesystem state delivered by bootstrap at the readiness handoff.
#[derive(Debug)]
pub struct FsState {
    /// The immutable bind map tree.
    pub tree: MountTree,
    /// Log per-request resolution decisions at info level.
    pub debug: bool,
    /// Suppress real-entry merging when listing virtual-only directories.
    pub strict_virtual: bool,
}

/// The bind-map filesystem served through fuser.
///
/// Real file handles are host descriptors reinterpreted as `u64`;
/// [`NO_HANDLE`] marks synthesized virtual directory handles. The inode
/// table recovers the virtual path behind each kernel inode, and every
/// operation re-resolves that path through the mount tree; nothing is
/// cached between requests.
pub struct BindMapFs {
    ready: Option<Receiver<anyhow::Result<FsState>>>,
    state: Option<FsState>,
    inodes: Mutex<InodeTable>,
    trace: TraceFilter,
}

impl BindMapFs {
    /// Create a shim that will wait for bootstrap on the given channel
    /// during its `init` callback.
    #[must_use]
    pub fn new(ready: Receiver<anyhow::Result<FsState>>) -> Self {
        Self {
            ready: Some(ready),
            state: None,
            inodes: Mutex::new(InodeTable::new()),
            trace: TraceFilter::from_env(),
        }
    }

    /// Create a shim already past the readiness handoff.
    #[must_use]
    pub fn with_state(state: FsState) -> Self {
        Self {
            ready: None,
            state: Some(state),
            inodes: Mutex::new(InodeTable::new()),
            trace: TraceFilter::from_env(),
        }
    }

    fn trace_op(&self, operation: &str, detail: impl FnOnce() -> String) {
        if self.trace.enabled(operation) {
            info!("{operation}({})", detail());
        }
    }

    fn vpath_of(&self, inode: u64) -> Option<String> {
        self.inodes
            .lock()
            .expect("inode lock")
            .path_of(inode)
            .map(str::to_owned)
    }

    fn register(&self, vpath: &str) -> u64 {
        self.inodes.lock().expect("inode lock").insert(vpath)
    }

    fn resolve(&self, state: &FsState, vpath: &str) -> String {
        let real = state.tree.resolve(vpath);
        if state.debug {
            info!("resolve: virtual={vpath} real={real}");
        } else {
            debug!("resolve: virtual={vpath} real={real}");
        }
        real
    }

    /// Build the full directory listing for a virtual path: synthesized
    /// children first, then `.` and `..` and the real entries, with real
    /// names shadowed by same-named synthetic children.
    fn assemble_listing(
        &self,
        state: &FsState,
        vpath: &str,
        inode: u64,
    ) -> Result<Vec<(u64, FileType, String)>, i32> {
        let node = state.tree.lookup(vpath);
        let mut entries: Vec<(u64, FileType, String)> = Vec::new();
        if let Some(node) = node {
            for name in node.child_names() {
                let child = child_vpath(vpath, &name);
                let child_inode = self.register(&child);
                let kind = match sys::lstat(&self.resolve(state, &child)) {
                    Ok(st) => attr::file_type_of_mode(st.st_mode as u32),
                    Err(_) => FileType::Directory,
                };
                entries.push((child_inode, kind, name));
            }
        }
        let suppress_real = state.strict_virtual && node.is_some_and(|n| n.is_virtual());
        if !suppress_real {
            let real = self.resolve(state, vpath);
            match list_real_entries(&real) {
                Ok(real_entries) => {
                    entries.push((inode, FileType::Directory, ".".to_owned()));
                    let parent_inode = self.register(&parent_vpath(vpath));
                    entries.push((parent_inode, FileType::Directory, "..".to_owned()));
                    for (name, kind) in real_entries {
                        if node.is_some_and(|n| n.child(&name).is_some()) {
                            continue;
                        }
                        let child_inode = self.register(&child_vpath(vpath, &name));
                        entries.push((child_inode, kind, name));
                    }
                }
                Err(err) => {
                    if node.is_none() {
                        return Err(errno_of(&err));
                    }
                }
            }
        }
        Ok(entries)
    }
}

impl Filesystem for BindMapFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        let Some(ready) = self.ready.take() else {
            return Ok(());
        };
        match ready.recv() {
            Ok(Ok(state)) => {
                info!("bind map tree ready, serving requests");
                self.state = Some(state);
                Ok(())
            }
            Ok(Err(err)) => {
                error!("fatal: bootstrap failed: {err:#}");
                Err(libc::EIO)
            }
            Err(_) => {
                error!("fatal: bootstrap exited before signalling readiness");
                Err(libc::EIO)
            }
        }
    }

    fn destroy(&mut self) {
        info!("session ended");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &name.to_string_lossy());
        self.trace_op("lookup", || vpath.clone());
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::lstat(&real) {
            Ok(st) => {
                let inode = self.register(&vpath);
                reply.entry(&ATTR_TTL, &attr::stat_to_attr(inode, &st), 0);
            }
            Err(err) => match state.tree.lookup(&vpath) {
                Some(node) if node.is_virtual() => {
                    let inode = self.register(&vpath);
                    reply.entry(&ATTR_TTL, &attr::synthetic_dir_attr(inode), 0);
                }
                _ => reply.error(errno_of(&err)),
            },
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, fh: Option<u64>, reply: ReplyAttr) {
        self.trace_op("getattr", || format!("ino={ino} fh={fh:?}"));
        if let Some(fd) = fh.filter(|handle| *handle != NO_HANDLE) {
            match sys::fstat(fd as i32) {
                Ok(st) => reply.attr(&ATTR_TTL, &attr::stat_to_attr(ino, &st)),
                Err(err) => reply.error(errno_of(&err)),
            }
            return;
        }
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::lstat(&real) {
            Ok(st) => reply.attr(&ATTR_TTL, &attr::stat_to_attr(ino, &st)),
            Err(err) => match state.tree.lookup(&vpath) {
                Some(node) if node.is_virtual() => {
                    reply.attr(&ATTR_TTL, &attr::synthetic_dir_attr(ino));
                }
                _ => reply.error(errno_of(&err)),
            },
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        self.trace_op("setattr", || {
            format!("ino={ino} mode={mode:?} uid={uid:?} gid={gid:?} size={size:?}")
        });
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        if let Some(size) = size {
            let result = match fh.filter(|handle| *handle != NO_HANDLE) {
                Some(fd) => sys::ftruncate(fd as i32, size as i64),
                None => sys::truncate(&real, size as i64),
            };
            if let Err(err) = result {
                reply.error(errno_of(&err));
                return;
            }
        }
        if let Some(mode) = mode {
            if let Err(err) = sys::chmod(&real, mode) {
                reply.error(errno_of(&err));
                return;
            }
        }
        if uid.is_some() || gid.is_some() {
            if let Err(err) = sys::lchown(&real, uid, gid) {
                reply.error(errno_of(&err));
                return;
            }
        }
        if atime.is_some() || mtime.is_some() {
            let times = [timespec_of(atime), timespec_of(mtime)];
            if let Err(err) = sys::utimens(&real, times) {
                reply.error(errno_of(&err));
                return;
            }
        }
        match sys::lstat(&real) {
            Ok(st) => reply.attr(&ATTR_TTL, &attr::stat_to_attr(ino, &st)),
            Err(err) => match state.tree.lookup(&vpath) {
                Some(node) if node.is_virtual() => {
                    reply.attr(&ATTR_TTL, &attr::synthetic_dir_attr(ino));
                }
                _ => reply.error(errno_of(&err)),
            },
        }
    }

    fn mknod(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &name.to_string_lossy());
        self.trace_op("mknod", || format!("{vpath} mode={mode:#o} rdev={rdev}"));
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        let result = {
            let _creds = CredScope::adopt(req.uid(), req.gid());
            sys::mknod(&real, mode, rdev)
        };
        if let Err(err) = result {
            reply.error(errno_of(&err));
            return;
        }
        match sys::lstat(&real) {
            Ok(st) => {
                let inode = self.register(&vpath);
                reply.entry(&ATTR_TTL, &attr::stat_to_attr(inode, &st), 0);
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &name.to_string_lossy());
        self.trace_op("mkdir", || format!("{vpath} mode={mode:#o}"));
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        let result = {
            let _creds = CredScope::adopt(req.uid(), req.gid());
            sys::mkdir(&real, mode)
        };
        if let Err(err) = result {
            reply.error(errno_of(&err));
            return;
        }
        match sys::lstat(&real) {
            Ok(st) => {
                let inode = self.register(&vpath);
                reply.entry(&ATTR_TTL, &attr::stat_to_attr(inode, &st), 0);
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &name.to_string_lossy());
        self.trace_op("unlink", || vpath.clone());
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::unlink(&real) {
            Ok(()) => {
                self.inodes.lock().expect("inode lock").remove(&vpath);
                reply.ok();
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &name.to_string_lossy());
        self.trace_op("rmdir", || vpath.clone());
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::rmdir(&real) {
            Ok(()) => {
                self.inodes.lock().expect("inode lock").remove(&vpath);
                reply.ok();
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn symlink(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &link_name.to_string_lossy());
        self.trace_op("symlink", || {
            format!("{vpath} -> {}", target.display())
        });
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        // Only the new path is resolved; the link target is stored verbatim.
        let real = self.resolve(state, &vpath);
        let result = {
            let _creds = CredScope::adopt(req.uid(), req.gid());
            sys::symlink(target.as_os_str(), &real)
        };
        if let Err(err) = result {
            reply.error(errno_of(&err));
            return;
        }
        match sys::lstat(&real) {
            Ok(st) => {
                let inode = self.register(&vpath);
                reply.entry(&ATTR_TTL, &attr::stat_to_attr(inode, &st), 0);
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        self.trace_op("readlink", || format!("ino={ino}"));
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::readlink(&real) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn link(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let Some(old_vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(parent_path) = self.vpath_of(newparent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let new_vpath = child_vpath(&parent_path, &newname.to_string_lossy());
        self.trace_op("link", || format!("{old_vpath} -> {new_vpath}"));
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let old_real = self.resolve(state, &old_vpath);
        let new_real = self.resolve(state, &new_vpath);
        let result = {
            let _creds = CredScope::adopt(req.uid(), req.gid());
            sys::link(&old_real, &new_real)
        };
        if let Err(err) = result {
            reply.error(errno_of(&err));
            return;
        }
        match sys::lstat(&new_real) {
            Ok(st) => {
                let inode = self.register(&new_vpath);
                reply.entry(&ATTR_TTL, &attr::stat_to_attr(inode, &st), 0);
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn rename(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        // Exchange/noreplace semantics are not implemented by rename(2).
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Some(old_parent) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(new_parent) = self.vpath_of(newparent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let old_vpath = child_vpath(&old_parent, &name.to_string_lossy());
        let new_vpath = child_vpath(&new_parent, &newname.to_string_lossy());
        self.trace_op("rename", || format!("{old_vpath} -> {new_vpath}"));
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let old_real = self.resolve(state, &old_vpath);
        let new_real = self.resolve(state, &new_vpath);
        let result = {
            let _creds = CredScope::adopt(req.uid(), req.gid());
            sys::rename(&old_real, &new_real)
        };
        match result {
            Ok(()) => {
                self.inodes
                    .lock()
                    .expect("inode lock")
                    .rekey(&old_vpath, &new_vpath);
                reply.ok();
            }
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        self.trace_op("open", || format!("ino={ino} flags={flags:#x}"));
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::open(&real, flags, 0) {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.vpath_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let vpath = child_vpath(&parent_path, &name.to_string_lossy());
        self.trace_op("create", || format!("{vpath} mode={mode:#o} flags={flags:#x}"));
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        let result = {
            let _creds = CredScope::adopt(req.uid(), req.gid());
            sys::open(&real, flags | libc::O_CREAT, mode)
        };
        let fd = match result {
            Ok(fd) => fd,
            Err(err) => {
                reply.error(errno_of(&err));
                return;
            }
        };
        match sys::lstat(&real) {
            Ok(st) => {
                let inode = self.register(&vpath);
                reply.created(&ATTR_TTL, &attr::stat_to_attr(inode, &st), 0, fd as u64, 0);
            }
            Err(err) => {
                let _ = sys::close(fd);
                reply.error(errno_of(&err));
            }
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        self.trace_op("read", || format!("fh={fh} offset={offset} size={size}"));
        if fh == NO_HANDLE {
            reply.error(libc::EBADF);
            return;
        }
        match sys::pread(fh as i32, size as usize, offset) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        self.trace_op("write", || {
            format!("fh={fh} offset={offset} len={}", data.len())
        });
        if fh == NO_HANDLE {
            reply.error(libc::EBADF);
            return;
        }
        match sys::pwrite(fh as i32, data, offset) {
            Ok(written) => reply.written(written as u32),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.trace_op("release", || format!("fh={fh}"));
        if fh == NO_HANDLE {
            reply.ok();
            return;
        }
        match sys::close(fh as i32) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn fsync(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, datasync: bool, reply: ReplyEmpty) {
        self.trace_op("fsync", || format!("fh={fh} datasync={datasync}"));
        if fh == NO_HANDLE {
            reply.error(libc::EBADF);
            return;
        }
        match sys::fsync(fh as i32, datasync) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        self.trace_op("opendir", || format!("ino={ino}"));
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::open(&real, libc::O_RDONLY | libc::O_DIRECTORY, 0) {
            Ok(fd) => reply.opened(fd as u64, 0),
            Err(err) => match state.tree.lookup(&vpath) {
                Some(node) if node.is_virtual() => reply.opened(NO_HANDLE, 0),
                _ => reply.error(errno_of(&err)),
            },
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        self.trace_op("readdir", || format!("ino={ino} offset={offset}"));
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        match self.assemble_listing(state, &vpath, ino) {
            Ok(entries) => {
                let start = offset.max(0) as usize;
                for (idx, (entry_inode, kind, name)) in
                    entries.into_iter().enumerate().skip(start)
                {
                    if reply.add(entry_inode, (idx + 1) as i64, kind, name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        self.trace_op("releasedir", || format!("fh={fh}"));
        if fh == NO_HANDLE {
            reply.ok();
            return;
        }
        match sys::close(fh as i32) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_of(&err)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        self.trace_op("statfs", || format!("ino={ino}"));
        let Some(vpath) = self.vpath_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(state) = self.state.as_ref() else {
            reply.error(libc::EIO);
            return;
        };
        let real = self.resolve(state, &vpath);
        match sys::statvfs(&real) {
            Ok(st) => reply.statfs(
                st.f_blocks,
                st.f_bfree,
                st.f_bavail,
                st.f_files,
                st.f_ffree,
                st.f_bsize as u32,
                255,
                1,
            ),
            Err(err) => reply.error(errno_of(&err)),
        }
    }
}

/// Join a virtual directory path and a child name.
fn child_vpath(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Parent of a virtual path; the root is its own parent.
fn parent_vpath(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_owned(),
        Some(idx) => path[..idx].to_owned(),
    }
}

fn errno_of(err: &io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

/// List a real directory's entry names and types.
fn list_real_entries(real: &str) -> io::Result<Vec<(String, FileType)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(Path::new(host_path(real)))? {
        let entry = entry?;
        let kind = entry
            .file_type()
            .map(file_type_of_fs)
            .unwrap_or(FileType::RegularFile);
        entries.push((entry.file_name().to_string_lossy().into_owned(), kind));
    }
    Ok(entries)
}

fn file_type_of_fs(file_type: std::fs::FileType) -> FileType {
    use std::os::unix::fs::FileTypeExt;
    if file_type.is_dir() {
        FileType::Directory
    } else if file_type.is_symlink() {
        FileType::Symlink
    } else if file_type.is_block_device() {
        FileType::BlockDevice
    } else if file_type.is_char_device() {
        FileType::CharDevice
    } else if file_type.is_fifo() {
        FileType::NamedPipe
    } else if file_type.is_socket() {
        FileType::Socket
    } else {
        FileType::RegularFile
    }
}

fn timespec_of(time: Option<TimeOrNow>) -> libc::timespec {
    match time {
        Some(TimeOrNow::SpecificTime(at)) => {
            let since_epoch = at.duration_since(UNIX_EPOCH).unwrap_or_default();
            libc::timespec {
                tv_sec: since_epoch.as_secs() as libc::time_t,
                tv_nsec: libc::c_long::from(since_epoch.subsec_nanos()),
            }
        }
        Some(TimeOrNow::Now) => libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_NOW,
        },
        None => libc::timespec {
            tv_sec: 0,
            tv_nsec: libc::UTIME_OMIT,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::fs as stdfs;

    use tempfile::tempdir;

    use super::*;
    use crate::inode::ROOT_INODE;

    fn state_with(mounts: &[(&str, &str)], strict_virtual: bool) -> FsState {
        let mut tree = MountTree::new();
        for (virtual_path, real_path) in mounts {
            tree.insert(virtual_path, real_path);
        }
        FsState {
            tree,
            debug: false,
            strict_virtual,
        }
    }

    fn names(entries: &[(u64, FileType, String)]) -> Vec<&str> {
        entries.iter().map(|(_, _, name)| name.as_str()).collect()
    }

    #[test]
    fn vpath_join_and_parent() {
        assert_eq!(child_vpath("/", "a"), "/a");
        assert_eq!(child_vpath("/a", "b"), "/a/b");
        assert_eq!(parent_vpath("/a/b"), "/a");
        assert_eq!(parent_vpath("/a"), "/");
        assert_eq!(parent_vpath("/"), "/");
    }

    #[test]
    fn listing_merges_synthetic_and_real_entries() {
        let root = tempdir().expect("tempdir");
        let backing = tempdir().expect("backing");
        stdfs::create_dir(root.path().join("a")).expect("mkdir a");
        stdfs::write(root.path().join("a/k"), b"real k").expect("write k");
        stdfs::write(root.path().join("a/q"), b"real q").expect("write q");
        let root_path = root.path().to_str().expect("utf8").to_owned();
        let backing_path = backing.path().to_str().expect("utf8").to_owned();
        let state = state_with(
            &[("/", root_path.as_str()), ("/a/k", backing_path.as_str())],
            false,
        );
        let fs = BindMapFs::with_state(state);
        let ino = fs.register("/a");
        let state = fs.state.as_ref().expect("state");
        let entries = fs.assemble_listing(state, "/a", ino).expect("listing");
        let listed = names(&entries);
        // Synthetic k first, dots from the real listing, real q; real k shadowed.
        assert_eq!(listed[0], "k");
        assert_eq!(&listed[1..3], &[".", ".."]);
        assert!(listed[3..].contains(&"q"));
        assert_eq!(listed.iter().filter(|name| **name == "k").count(), 1);
        assert_eq!(listed.iter().filter(|name| **name == ".").count(), 1);
        assert_eq!(listed.iter().filter(|name| **name == "..").count(), 1);
        // The synthetic child resolves into its own backing, a directory.
        assert_eq!(entries[0].1, FileType::Directory);
    }

    #[test]
    fn virtual_listing_survives_missing_backing() {
        let root = tempdir().expect("tempdir");
        let root_path = root.path().to_str().expect("utf8").to_owned();
        let state = state_with(
            &[("/", root_path.as_str()), ("/p/q/r", "/data")],
            false,
        );
        let fs = BindMapFs::with_state(state);
        let state = fs.state.as_ref().expect("state");
        let root_listing = fs
            .assemble_listing(state, "/", ROOT_INODE)
            .expect("root listing");
        assert_eq!(names(&root_listing), vec!["p", ".", ".."]);
        // /p has no real backing under the root; its children still list.
        let ino = fs.register("/p");
        let p_listing = fs.assemble_listing(state, "/p", ino).expect("p listing");
        assert_eq!(names(&p_listing), vec!["q"]);
    }

    #[test]
    fn unmapped_missing_directory_propagates_errno() {
        let root = tempdir().expect("tempdir");
        let root_path = root.path().to_str().expect("utf8").to_owned();
        let state = state_with(&[("/", root_path.as_str())], false);
        let fs = BindMapFs::with_state(state);
        let state = fs.state.as_ref().expect("state");
        let ino = fs.register("/missing");
        let err = fs
            .assemble_listing(state, "/missing", ino)
            .expect_err("no such dir");
        assert_eq!(err, libc::ENOENT);
    }

    #[test]
    fn strict_virtual_suppresses_real_merge() {
        let root = tempdir().expect("tempdir");
        stdfs::create_dir(root.path().join("p")).expect("mkdir p");
        stdfs::write(root.path().join("p/stray"), b"x").expect("write stray");
        let root_path = root.path().to_str().expect("utf8").to_owned();
        let merged = state_with(
            &[("/", root_path.as_str()), ("/p/q", "/data")],
            false,
        );
        let fs = BindMapFs::with_state(merged);
        let state = fs.state.as_ref().expect("state");
        let ino = fs.register("/p");
        let listing = fs.assemble_listing(state, "/p", ino).expect("listing");
        assert!(names(&listing).contains(&"stray"));

        let strict = state_with(
            &[("/", root_path.as_str()), ("/p/q", "/data")],
            true,
        );
        let fs = BindMapFs::with_state(strict);
        let state = fs.state.as_ref().expect("state");
        let ino = fs.register("/p");
        let listing = fs.assemble_listing(state, "/p", ino).expect("listing");
        assert_eq!(names(&listing), vec!["q"]);
    }
}
