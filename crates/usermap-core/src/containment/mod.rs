//! Privilege containment.
//!
//! Converts a privileged, unconfined process into one that is chrooted to
//! the source directory and permanently runs as the source identity. The
//! sequence is a chain of owned states; each transition consumes the
//! previous value, so no step can run out of order and nothing can be
//! served before [`MountSession`] exists.
//!
//! ```text
//! Unconfined --confine()--> Confined --drop_identity()--> MountSession
//!   umask(0)                  setresgid(gid)
//!   setfsuid(uid)             setresuid(uid)
//!   initgroups(user, gid)     verify
//!   chroot(source), chdir("/")
//! ```
//!
//! `initgroups` must precede `chroot`: the group database lives outside
//! the confined tree. The group id must be dropped before the user id,
//! which removes the capability to change groups.

pub mod system;

use std::ffi::{CStr, CString};
use std::fmt;
use std::path::Path;

use nix::unistd::{Gid, Uid};
use usermap_common::error::{Result, UsermapError};

use crate::identity::ResolvedIdentity;

pub use system::SystemPrivileges;

/// Step names reported in containment errors and logs.
pub mod step {
    /// Clearing the file-creation mask.
    pub const UMASK: &str = "umask";
    /// Setting the filesystem user id.
    pub const SETFSUID: &str = "setfsuid";
    /// Loading the supplementary group list.
    pub const INITGROUPS: &str = "initgroups";
    /// Changing the root directory.
    pub const CHROOT: &str = "chroot";
    /// Permanently setting the group ids.
    pub const SETGID: &str = "setresgid";
    /// Permanently setting the user ids.
    pub const SETUID: &str = "setresuid";
    /// Checking the final process identity.
    pub const VERIFY: &str = "verify";
}

/// Identity state of the process at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIdentity {
    /// Real user id.
    pub real_uid: Uid,
    /// Effective user id.
    pub effective_uid: Uid,
    /// Real group id.
    pub real_gid: Gid,
    /// Effective group id.
    pub effective_gid: Gid,
    /// User id used for filesystem permission checks.
    pub fs_uid: Uid,
}

impl fmt::Display for ProcessIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ruid={} euid={} rgid={} egid={} fsuid={}",
            self.real_uid, self.effective_uid, self.real_gid, self.effective_gid, self.fs_uid
        )
    }
}

/// The privileged primitives the containment sequence is built from.
///
/// [`SystemPrivileges`] performs the real system calls. Every method
/// maps to one kernel operation and reports its `errno` on failure.
pub trait PrivilegeOps {
    /// Reads the current process identity.
    fn snapshot(&self) -> ProcessIdentity;

    /// Clears the file-creation mask.
    fn clear_umask(&mut self);

    /// Sets the filesystem user id.
    ///
    /// # Errors
    ///
    /// Returns the `errno` if the id did not take effect.
    fn set_fs_uid(&mut self, uid: Uid) -> nix::Result<()>;

    /// Initializes the supplementary group list of `user`, adding `gid`.
    ///
    /// # Errors
    ///
    /// Returns the `errno` reported by `initgroups(3)`.
    fn init_groups(&mut self, user: &CStr, gid: Gid) -> nix::Result<()>;

    /// Changes the root directory to `path` and moves into it.
    ///
    /// # Errors
    ///
    /// Returns the `errno` reported by `chroot(2)` or `chdir(2)`.
    fn change_root(&mut self, path: &Path) -> nix::Result<()>;

    /// Sets the real, effective and saved group ids.
    ///
    /// # Errors
    ///
    /// Returns the `errno` reported by `setresgid(2)`.
    fn set_group(&mut self, gid: Gid) -> nix::Result<()>;

    /// Sets the real, effective and saved user ids.
    ///
    /// # Errors
    ///
    /// Returns the `errno` reported by `setresuid(2)`.
    fn set_user(&mut self, uid: Uid) -> nix::Result<()>;
}

fn failed(step: &'static str) -> impl FnOnce(nix::Error) -> UsermapError {
    move |e| {
        tracing::error!(step, error = %e, "containment step failed");
        UsermapError::Containment {
            step,
            source: e.into(),
        }
    }
}

/// Privileged, unconfined process holding a resolved identity.
pub struct Unconfined<P: PrivilegeOps> {
    identity: ResolvedIdentity,
    ops: P,
    before: ProcessIdentity,
}

impl<P: PrivilegeOps> Unconfined<P> {
    /// Captures the starting identity of the process.
    pub fn new(identity: ResolvedIdentity, ops: P) -> Self {
        let before = ops.snapshot();
        tracing::debug!(%before, "process identity before containment");
        Self {
            identity,
            ops,
            before,
        }
    }

    /// Confines the process to the source directory.
    ///
    /// Clears the umask, switches the filesystem uid, loads the
    /// supplementary groups, then changes root.
    ///
    /// # Errors
    ///
    /// Returns [`UsermapError::Containment`] naming the first step that
    /// failed; later steps are not attempted.
    pub fn confine(mut self) -> Result<Confined<P>> {
        let id = &self.identity;
        let user = CString::new(id.source_user.as_bytes())
            .map_err(|_| nix::Error::EINVAL)
            .map_err(failed(step::INITGROUPS))?;

        self.ops.clear_umask();
        tracing::debug!(step = step::UMASK, "cleared file-creation mask");

        self.ops
            .set_fs_uid(id.source_uid)
            .map_err(failed(step::SETFSUID))?;
        tracing::debug!(step = step::SETFSUID, uid = %id.source_uid, "filesystem uid set");

        self.ops
            .init_groups(&user, id.source_gid)
            .map_err(failed(step::INITGROUPS))?;
        tracing::debug!(step = step::INITGROUPS, user = %id.source_user, "supplementary groups loaded");

        self.ops
            .change_root(&id.source_path)
            .map_err(failed(step::CHROOT))?;
        tracing::info!(root = %id.source_path.display(), "process confined");

        Ok(Confined {
            identity: self.identity,
            ops: self.ops,
            before: self.before,
        })
    }
}

/// Chrooted process that still holds its original real identity.
pub struct Confined<P: PrivilegeOps> {
    identity: ResolvedIdentity,
    ops: P,
    before: ProcessIdentity,
}

impl<P: PrivilegeOps> Confined<P> {
    /// Permanently assumes the source identity, group first.
    ///
    /// # Errors
    ///
    /// Returns [`UsermapError::Containment`] if either id change fails or
    /// the resulting process identity is not exactly the source identity.
    pub fn drop_identity(mut self) -> Result<MountSession> {
        let uid = self.identity.source_uid;
        let gid = self.identity.source_gid;

        self.ops.set_group(gid).map_err(failed(step::SETGID))?;
        self.ops.set_user(uid).map_err(failed(step::SETUID))?;

        let after = self.ops.snapshot();
        let exact = after.real_uid == uid
            && after.effective_uid == uid
            && after.fs_uid == uid
            && after.real_gid == gid
            && after.effective_gid == gid;
        if !exact {
            return Err(failed(step::VERIFY)(nix::Error::EPERM));
        }
        tracing::info!(%after, "privileges dropped permanently");

        Ok(MountSession {
            identity: self.identity,
            before: self.before,
            after,
        })
    }
}

/// Immutable record of a completed containment.
///
/// Only [`Confined::drop_identity`] can produce one, so holding a
/// `MountSession` proves the process is confined and unprivileged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSession {
    identity: ResolvedIdentity,
    before: ProcessIdentity,
    after: ProcessIdentity,
}

impl MountSession {
    /// The identity the process now runs as.
    #[must_use]
    pub const fn identity(&self) -> &ResolvedIdentity {
        &self.identity
    }

    /// Process identity before containment started.
    #[must_use]
    pub const fn before(&self) -> ProcessIdentity {
        self.before
    }

    /// Process identity after containment completed.
    #[must_use]
    pub const fn after(&self) -> ProcessIdentity {
        self.after
    }
}

/// Runs the whole containment sequence.
///
/// # Errors
///
/// Returns the first failing step; see [`Unconfined::confine`] and
/// [`Confined::drop_identity`].
pub fn contain<P: PrivilegeOps>(identity: ResolvedIdentity, ops: P) -> Result<MountSession> {
    Unconfined::new(identity, ops).confine()?.drop_identity()
}
