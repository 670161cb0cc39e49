// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Wrap the host syscalls used by the operation shim.
// Author: Lukas Bower

//! Thin safe wrappers over the host syscalls the shim needs. All failures
//! carry the raw OS errno via `std::io::Error`; nothing here retries or
//! rewrites error codes. Every `unsafe` block in the crate lives in this
//! module.

use std::ffi::{CString, OsStr};
use std::io;
use std::os::unix::ffi::OsStrExt;

use crate::{host_path, READLINK_BUF};

fn cstr(path: &str) -> io::Result<CString> {
    CString::new(host_path(path))
        .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

fn cstr_bytes(bytes: &[u8]) -> io::Result<CString> {
    CString::new(bytes).map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))
}

fn check(rc: libc::c_int) -> io::Result<()> {
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Clear the process file-mode creation mask so caller modes pass through.
pub fn umask_zero() {
    unsafe {
        libc::umask(0);
    }
}

/// Effective uid of the serving process.
#[must_use]
pub fn euid() -> u32 {
    unsafe { libc::geteuid() }
}

/// Effective gid of the serving process.
#[must_use]
pub fn egid() -> u32 {
    unsafe { libc::getegid() }
}

/// Set the calling thread's effective uid.
///
/// Issues the raw syscall: the libc wrapper broadcasts the change to every
/// thread in the process, which would leak a borrowed identity into
/// concurrent requests.
pub fn set_thread_euid(uid: u32) -> io::Result<()> {
    let rc = unsafe { libc::syscall(libc::SYS_setresuid, -1i64, i64::from(uid), -1i64) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Set the calling thread's effective gid. Raw syscall, as for the uid.
pub fn set_thread_egid(gid: u32) -> io::Result<()> {
    let rc = unsafe { libc::syscall(libc::SYS_setresgid, -1i64, i64::from(gid), -1i64) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// lstat the path (symlinks are not followed).
pub fn lstat(path: &str) -> io::Result<libc::stat> {
    let c = cstr(path)?;
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::lstat(c.as_ptr(), &mut st) })?;
    Ok(st)
}

/// fstat an open descriptor.
pub fn fstat(fd: i32) -> io::Result<libc::stat> {
    let mut st: libc::stat = unsafe { std::mem::zeroed() };
    check(unsafe { libc::fstat(fd, &mut st) })?;
    Ok(st)
}

/// statvfs the filesystem holding the path.
pub fn statvfs(path: &str) -> io::Result<libc::statvfs> {
    let c = cstr(path)?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    check(unsafe { libc::statvfs(c.as_ptr(), &mut st) })?;
    Ok(st)
}

/// Create a filesystem node.
pub fn mknod(path: &str, mode: u32, rdev: u32) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::mknod(c.as_ptr(), mode as libc::mode_t, libc::dev_t::from(rdev)) })
}

/// Create a directory.
pub fn mkdir(path: &str, mode: u32) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::mkdir(c.as_ptr(), mode as libc::mode_t) })
}

/// Remove a file.
pub fn unlink(path: &str) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::unlink(c.as_ptr()) })
}

/// Remove an empty directory.
pub fn rmdir(path: &str) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::rmdir(c.as_ptr()) })
}

/// Create a hard link.
pub fn link(old_path: &str, new_path: &str) -> io::Result<()> {
    let old = cstr(old_path)?;
    let new = cstr(new_path)?;
    check(unsafe { libc::link(old.as_ptr(), new.as_ptr()) })
}

/// Create a symbolic link; the target is stored verbatim.
pub fn symlink(target: &OsStr, new_path: &str) -> io::Result<()> {
    let target = cstr_bytes(target.as_bytes())?;
    let new = cstr(new_path)?;
    check(unsafe { libc::symlink(target.as_ptr(), new.as_ptr()) })
}

/// Read a symlink target into a fixed buffer and return the byte prefix.
pub fn readlink(path: &str) -> io::Result<Vec<u8>> {
    let c = cstr(path)?;
    let mut buf = [0u8; READLINK_BUF];
    let n = unsafe { libc::readlink(c.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(buf[..n as usize].to_vec())
}

/// Rename a file or directory.
pub fn rename(old_path: &str, new_path: &str) -> io::Result<()> {
    let old = cstr(old_path)?;
    let new = cstr(new_path)?;
    check(unsafe { libc::rename(old.as_ptr(), new.as_ptr()) })
}

/// Change mode bits on the path.
pub fn chmod(path: &str, mode: u32) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::chmod(c.as_ptr(), mode as libc::mode_t) })
}

/// Change ownership of the link itself (no dereference). `None` leaves the
/// corresponding id unchanged.
pub fn lchown(path: &str, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe {
        libc::lchown(
            c.as_ptr(),
            uid.unwrap_or(libc::uid_t::MAX),
            gid.unwrap_or(libc::gid_t::MAX),
        )
    })
}

/// Set access and modification times with nanosecond precision.
pub fn utimens(path: &str, times: [libc::timespec; 2]) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::utimensat(libc::AT_FDCWD, c.as_ptr(), times.as_ptr(), 0) })
}

/// Open the path; the returned descriptor doubles as the FUSE file handle.
pub fn open(path: &str, flags: i32, mode: u32) -> io::Result<i32> {
    let c = cstr(path)?;
    let fd = unsafe { libc::open(c.as_ptr(), flags, mode as libc::c_uint) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

/// Close a descriptor.
pub fn close(fd: i32) -> io::Result<()> {
    check(unsafe { libc::close(fd) })
}

/// Positional read from an open descriptor.
pub fn pread(fd: i32, size: usize, offset: i64) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let n = unsafe { libc::pread(fd, buf.as_mut_ptr().cast(), size, offset) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    buf.truncate(n as usize);
    Ok(buf)
}

/// Positional write to an open descriptor.
pub fn pwrite(fd: i32, data: &[u8], offset: i64) -> io::Result<usize> {
    let n = unsafe { libc::pwrite(fd, data.as_ptr().cast(), data.len(), offset) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Flush a descriptor; `datasync` skips metadata where the host allows.
pub fn fsync(fd: i32, datasync: bool) -> io::Result<()> {
    let rc = if datasync {
        unsafe { libc::fdatasync(fd) }
    } else {
        unsafe { libc::fsync(fd) }
    };
    check(rc)
}

/// Truncate by path.
pub fn truncate(path: &str, size: i64) -> io::Result<()> {
    let c = cstr(path)?;
    check(unsafe { libc::truncate(c.as_ptr(), size as libc::off_t) })
}

/// Truncate by descriptor.
pub fn ftruncate(fd: i32, size: i64) -> io::Result<()> {
    check(unsafe { libc::ftruncate(fd, size as libc::off_t) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_addresses_cwd() {
        let st = lstat("").expect("lstat cwd");
        assert_eq!(st.st_mode & libc::S_IFMT, libc::S_IFDIR);
    }

    #[test]
    fn nul_byte_is_einval() {
        let err = lstat("a\0b").expect_err("NUL must fail");
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn missing_path_reports_enoent() {
        let err = lstat("/no/such/bindmapfs/path").expect_err("must fail");
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
