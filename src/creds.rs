// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Adopt caller credentials around creation-style syscalls.
// Author: Lukas Bower
#![forbid(unsafe_code)]

use log::error;

use crate::sys;

/// Scoped adoption of a caller's identity.
///
/// When the serving process runs as root, creation-style operations must
/// appear to the host as performed by the caller. The scope switches the
/// calling thread's effective gid, then uid, and restores both (uid first,
/// to regain the privilege needed for the gid) when dropped, on every exit
/// path including unwinding. When the process is not root the scope is a
/// no-op.
#[derive(Debug)]
pub struct CredScope {
    restore: Option<(u32, u32)>,
}

impl CredScope {
    /// Enter the scope for the given caller, if the process is privileged.
    #[must_use]
    pub fn adopt(uid: u32, gid: u32) -> Self {
        let euid = sys::euid();
        if euid != 0 {
            return Self { restore: None };
        }
        let egid = sys::egid();
        if let Err(err) = sys::set_thread_egid(gid) {
            error!("credential scope: set gid {gid}: {err}");
            return Self { restore: None };
        }
        if let Err(err) = sys::set_thread_euid(uid) {
            error!("credential scope: set uid {uid}: {err}");
            if let Err(err) = sys::set_thread_egid(egid) {
                error!("credential scope: restore gid {egid}: {err}");
            }
            return Self { restore: None };
        }
        Self {
            restore: Some((euid, egid)),
        }
    }

    /// Returns true when the scope actually switched identity.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.restore.is_some()
    }
}

impl Drop for CredScope {
    fn drop(&mut self) {
        if let Some((euid, egid)) = self.restore.take() {
            if let Err(err) = sys::set_thread_euid(euid) {
                error!("credential scope: restore uid {euid}: {err}");
            }
            if let Err(err) = sys::set_thread_egid(egid) {
                error!("credential scope: restore gid {egid}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprivileged_scope_is_inert() {
        if sys::euid() == 0 {
            return;
        }
        let scope = CredScope::adopt(1000, 1000);
        assert!(!scope.is_active());
    }
}
