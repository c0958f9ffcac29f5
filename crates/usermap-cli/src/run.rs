//! Startup pipeline: resolve, mount, detach, contain, serve.
//!
//! The mount must exist before containment because it needs privilege and
//! the real mountpoint, neither of which survive the root change. The
//! mounted filesystem answers nothing until the completed containment is
//! handed to it.

use std::path::PathBuf;

use anyhow::Context;
use usermap_common::config::UsermapConfig;
use usermap_core::containment::{SystemPrivileges, contain};
use usermap_core::directory::{IdentityDirectory, SystemDirectory};
use usermap_core::identity::{ResolvedIdentity, resolve};
use usermap_fs::{MountSettings, PendingMount, mount_options};

/// Everything decided before the first privileged action.
#[derive(Debug)]
pub struct Plan {
    /// Identity to assume and directory to serve.
    pub identity: ResolvedIdentity,
    /// Kernel options and reported owner for the FUSE mount.
    pub mount: MountSettings,
    /// Where to mount.
    pub mountpoint: PathBuf,
}

/// Resolves the source and translates the mount options.
///
/// # Errors
///
/// Returns an error on any identity resolution failure or an unrecognized
/// mount option without `-s`.
pub fn prepare(config: &UsermapConfig, directory: &impl IdentityDirectory) -> anyhow::Result<Plan> {
    let (identity, passthrough) = resolve(&config.source, &config.merged_options(), directory)?;
    let mount = mount_options(
        &identity.mount_options(&passthrough),
        &identity.source_path,
        config.sloppy,
    )?;
    Ok(Plan {
        identity,
        mount,
        mountpoint: config.mountpoint.clone(),
    })
}

/// Runs one mount from start to unmount.
///
/// # Errors
///
/// Returns the first startup failure, or a failure of the request loop.
pub fn execute(config: &UsermapConfig) -> anyhow::Result<()> {
    let plan = prepare(config, &SystemDirectory)?;
    if config.no_mtab {
        tracing::debug!("mount table registration left to the mount helper");
    }

    let pending = PendingMount::establish(&plan.mountpoint, &plan.mount)?;

    if !config.stays_in_foreground() {
        nix::unistd::daemon(false, false).context("failed to detach from the terminal")?;
    }

    let session = contain(plan.identity, SystemPrivileges)?;
    pending.serve(session)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use fuser::MountOption;
    use nix::unistd::{Gid, Uid};
    use usermap_fs::OwnerOverride;
    use usermap_common::error::{Result, UsermapError};
    use usermap_core::directory::{GroupRecord, UserRecord};

    use super::*;

    struct OneUser(PathBuf);

    impl IdentityDirectory for OneUser {
        fn user_by_name(&self, name: &str) -> Result<Option<UserRecord>> {
            Ok((name == "alice").then(|| UserRecord {
                name: "alice".into(),
                uid: Uid::from_raw(1001),
                gid: Gid::from_raw(100),
                home: self.0.clone(),
            }))
        }

        fn group_by_name(&self, _name: &str) -> Result<Option<GroupRecord>> {
            Ok(None)
        }
    }

    fn config(source: &str, options: &[&str], sloppy: bool) -> UsermapConfig {
        UsermapConfig {
            source: source.into(),
            mountpoint: PathBuf::from("/mnt/alice"),
            options: options.iter().map(|s| (*s).to_owned()).collect(),
            sloppy,
            ..UsermapConfig::default()
        }
    }

    #[test]
    fn prepare_builds_mount_options_for_home() {
        let home = tempfile::tempdir().unwrap();
        let dir = OneUser(home.path().to_path_buf());
        let plan = prepare(
            &config("alice", &["source_user=alice,rw,uid=5000", "user=alice"], false),
            &dir,
        )
        .unwrap();

        assert_eq!(plan.identity.source_path, home.path());
        assert_eq!(plan.mountpoint, Path::new("/mnt/alice"));
        assert_eq!(
            plan.mount.options,
            vec![
                MountOption::FSName(home.path().display().to_string()),
                MountOption::Subtype("usermap".into()),
            ]
        );
        assert_eq!(
            plan.mount.owner,
            OwnerOverride {
                uid: Some(1001),
                gid: Some(100),
            }
        );
    }

    #[test]
    fn explicit_uid_becomes_reported_owner() {
        let home = tempfile::tempdir().unwrap();
        let dir = OneUser(home.path().to_path_buf());
        let plan = prepare(&config("alice", &["source_user=alice,rw,uid=5000"], false), &dir).unwrap();
        assert_eq!(
            plan.mount.owner,
            OwnerOverride {
                uid: Some(5000),
                gid: None,
            }
        );
        assert_eq!(plan.mount.options.len(), 2);
    }

    #[test]
    fn prepare_rejects_unknown_option_unless_sloppy() {
        let home = tempfile::tempdir().unwrap();
        let dir = OneUser(home.path().to_path_buf());

        let err = prepare(&config("alice", &["frobnicate"], false), &dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UsermapError>(),
            Some(UsermapError::InvalidOption { .. })
        ));

        let plan = prepare(&config("alice", &["frobnicate"], true), &dir).unwrap();
        assert_eq!(plan.mount.options.len(), 2);
    }

    #[test]
    fn prepare_fails_before_mounting_for_unknown_user() {
        let home = tempfile::tempdir().unwrap();
        let dir = OneUser(home.path().to_path_buf());
        let err = prepare(&config("mallory", &[], false), &dir).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UsermapError>(),
            Some(UsermapError::UnknownUser { .. })
        ));
    }
}
