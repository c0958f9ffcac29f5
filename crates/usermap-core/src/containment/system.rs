//! Containment primitives backed by the real system calls.

use std::ffi::CStr;
use std::path::Path;

use nix::sys::stat::{Mode, umask};
use nix::unistd::{Gid, Uid};

use super::{PrivilegeOps, ProcessIdentity};

/// Performs containment on the calling process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPrivileges;

/// Reads the filesystem uid without changing it.
///
/// `setfsuid(2)` rejects `-1` and returns the current value.
#[cfg(target_os = "linux")]
fn current_fs_uid() -> Uid {
    nix::unistd::setfsuid(Uid::from_raw(u32::MAX))
}

#[cfg(not(target_os = "linux"))]
fn current_fs_uid() -> Uid {
    nix::unistd::geteuid()
}

impl PrivilegeOps for SystemPrivileges {
    fn snapshot(&self) -> ProcessIdentity {
        ProcessIdentity {
            real_uid: nix::unistd::getuid(),
            effective_uid: nix::unistd::geteuid(),
            real_gid: nix::unistd::getgid(),
            effective_gid: nix::unistd::getegid(),
            fs_uid: current_fs_uid(),
        }
    }

    fn clear_umask(&mut self) {
        let _ = umask(Mode::empty());
    }

    #[cfg(target_os = "linux")]
    fn set_fs_uid(&mut self, uid: Uid) -> nix::Result<()> {
        // setfsuid reports the previous value, never an error
        let _ = nix::unistd::setfsuid(uid);
        if current_fs_uid() == uid {
            Ok(())
        } else {
            Err(nix::Error::EPERM)
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn set_fs_uid(&mut self, _uid: Uid) -> nix::Result<()> {
        Err(nix::Error::ENOSYS)
    }

    fn init_groups(&mut self, user: &CStr, gid: Gid) -> nix::Result<()> {
        nix::unistd::initgroups(user, gid)
    }

    fn change_root(&mut self, path: &Path) -> nix::Result<()> {
        nix::unistd::chroot(path)?;
        nix::unistd::chdir("/")
    }

    fn set_group(&mut self, gid: Gid) -> nix::Result<()> {
        nix::unistd::setresgid(gid, gid, gid)
    }

    fn set_user(&mut self, uid: Uid) -> nix::Result<()> {
        nix::unistd::setresuid(uid, uid, uid)
    }
}
