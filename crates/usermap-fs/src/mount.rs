//! Mount establishment.
//!
//! The mount is created while the process still has privilege and can
//! still see the real mountpoint. The resulting [`PendingMount`] sits idle
//! until a [`MountSession`] proves containment is complete; only then
//! does it start answering requests.

use std::path::{Path, PathBuf};

use fuser::{MountOption, Session};
use usermap_common::constants::FS_SUBTYPE;
use usermap_common::error::{Result, UsermapError};
use usermap_core::containment::MountSession;
use usermap_core::options::OptionSet;

use crate::adapter::{OwnerOverride, UsermapFs};
use crate::translator::Translator;

/// Kernel option keys forwarded to the mount call unchanged.
const KERNEL_KEYS: [&str; 2] = ["max_read=", "blksize="];

/// What the mount needs: kernel options and the reported owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSettings {
    /// Options passed to the mount call.
    pub options: Vec<MountOption>,
    /// Owner and group every reply reports.
    pub owner: OwnerOverride,
}

enum Token {
    Mount(MountOption),
    Uid(u32),
    Gid(u32),
}

fn classify(token: &str) -> Option<Token> {
    if let Some(id) = token.strip_prefix("uid=") {
        return id.parse().ok().map(Token::Uid);
    }
    if let Some(id) = token.strip_prefix("gid=") {
        return id.parse().ok().map(Token::Gid);
    }
    typed_option(token).map(Token::Mount)
}

fn typed_option(token: &str) -> Option<MountOption> {
    let option = match token {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        "dirsync" => MountOption::DirSync,
        _ => {
            if let Some(name) = token.strip_prefix("fsname=") {
                MountOption::FSName(name.to_owned())
            } else if let Some(name) = token.strip_prefix("subtype=") {
                MountOption::Subtype(name.to_owned())
            } else if KERNEL_KEYS.iter().any(|key| token.starts_with(key)) {
                MountOption::CUSTOM(token.to_owned())
            } else {
                return None;
            }
        }
    };
    Some(option)
}

/// Translates option tokens into FUSE mount settings.
///
/// `uid=N` and `gid=N` never reach the kernel; they set the reported
/// owner, the last occurrence winning. Unrecognized tokens fail the
/// mount, or are dropped with a warning when `sloppy` is set. The
/// filesystem name defaults to `source` and the subtype to `usermap`.
///
/// # Errors
///
/// Returns [`UsermapError::InvalidOption`] for the first unrecognized
/// token when `sloppy` is not set.
pub fn mount_options(options: &OptionSet, source: &Path, sloppy: bool) -> Result<MountSettings> {
    let mut out = Vec::with_capacity(options.len() + 2);
    let mut owner = OwnerOverride::default();
    for token in options.iter() {
        match classify(token) {
            Some(Token::Mount(option)) => out.push(option),
            Some(Token::Uid(uid)) => owner.uid = Some(uid),
            Some(Token::Gid(gid)) => owner.gid = Some(gid),
            None if sloppy => tracing::warn!(option = token, "ignoring unrecognized mount option"),
            None => {
                return Err(UsermapError::InvalidOption {
                    option: token.to_owned(),
                });
            }
        }
    }
    if !out.iter().any(|opt| matches!(opt, MountOption::FSName(_))) {
        out.push(MountOption::FSName(source.display().to_string()));
    }
    if !out.iter().any(|opt| matches!(opt, MountOption::Subtype(_))) {
        out.push(MountOption::Subtype(FS_SUBTYPE.to_owned()));
    }
    Ok(MountSettings {
        options: out,
        owner,
    })
}

/// A mounted filesystem that does not serve requests yet.
pub struct PendingMount {
    session: Session<UsermapFs>,
    mountpoint: PathBuf,
}

impl std::fmt::Debug for PendingMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingMount")
            .field("mountpoint", &self.mountpoint)
            .finish_non_exhaustive()
    }
}

impl PendingMount {
    /// Mounts the filesystem on `mountpoint`.
    ///
    /// The served tree is `/`: requests are only answered after the
    /// process root has been moved to the source directory.
    ///
    /// # Errors
    ///
    /// Returns [`UsermapError::Mount`] if the FUSE session cannot be
    /// created.
    pub fn establish(mountpoint: &Path, settings: &MountSettings) -> Result<Self> {
        tracing::debug!(
            mountpoint = %mountpoint.display(),
            options = ?settings.options,
            owner = ?settings.owner,
            "mounting"
        );
        let fs = UsermapFs::new(Translator::confined(), settings.owner);
        let session = Session::new(fs, mountpoint, &settings.options).map_err(|source| UsermapError::Mount {
            mountpoint: mountpoint.to_path_buf(),
            source,
        })?;
        tracing::info!(mountpoint = %mountpoint.display(), "mounted");
        Ok(Self {
            session,
            mountpoint: mountpoint.to_path_buf(),
        })
    }

    /// Serves requests until the kernel reports unmount.
    ///
    /// # Errors
    ///
    /// Returns [`UsermapError::Mount`] if the request loop fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn serve(mut self, session: MountSession) -> Result<()> {
        tracing::info!(
            user = %session.identity().source_user,
            from = %session.before(),
            identity = %session.after(),
            "serving as contained identity"
        );
        self.session.run().map_err(|source| UsermapError::Mount {
            mountpoint: self.mountpoint.clone(),
            source,
        })?;
        tracing::info!(mountpoint = %self.mountpoint.display(), "unmounted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tokens: &[&str]) -> OptionSet {
        tokens.iter().copied().collect()
    }

    fn options(tokens: &[&str]) -> Vec<MountOption> {
        mount_options(&set(tokens), Path::new("/h"), false).unwrap().options
    }

    #[test]
    fn known_tokens_become_typed_options() {
        let opts = options(&["allow_other", "ro", "noexec"]);
        assert_eq!(opts[0], MountOption::AllowOther);
        assert_eq!(opts[1], MountOption::RO);
        assert_eq!(opts[2], MountOption::NoExec);
    }

    #[test]
    fn kernel_keys_are_forwarded_verbatim() {
        let opts = options(&["max_read=4096", "blksize=512"]);
        assert_eq!(opts[0], MountOption::CUSTOM("max_read=4096".into()));
        assert_eq!(opts[1], MountOption::CUSTOM("blksize=512".into()));
    }

    #[test]
    fn owner_ids_stay_out_of_kernel_options() {
        let settings = mount_options(&set(&["uid=5000", "gid=60", "rw"]), Path::new("/h"), false).unwrap();
        assert_eq!(
            settings.owner,
            OwnerOverride {
                uid: Some(5000),
                gid: Some(60),
            }
        );
        assert!(
            !settings
                .options
                .iter()
                .any(|opt| matches!(opt, MountOption::CUSTOM(_)))
        );
        assert_eq!(settings.options[0], MountOption::RW);
    }

    #[test]
    fn last_owner_id_wins() {
        let settings = mount_options(&set(&["uid=5000", "uid=1001"]), Path::new("/h"), false).unwrap();
        assert_eq!(settings.owner.uid, Some(1001));
        assert_eq!(settings.owner.gid, None);
    }

    #[test]
    fn malformed_owner_id_is_rejected() {
        let err = mount_options(&set(&["uid=alice"]), Path::new("/h"), false).unwrap_err();
        assert!(matches!(err, UsermapError::InvalidOption { option } if option == "uid=alice"));
    }

    #[test]
    fn defaults_name_the_source() {
        let opts = mount_options(&OptionSet::new(), Path::new("/home/alice"), false)
            .unwrap()
            .options;
        assert!(opts.contains(&MountOption::FSName("/home/alice".into())));
        assert!(opts.contains(&MountOption::Subtype("usermap".into())));
    }

    #[test]
    fn explicit_fsname_suppresses_default() {
        let opts = options(&["fsname=homes"]);
        let names: Vec<_> = opts
            .iter()
            .filter(|opt| matches!(opt, MountOption::FSName(_)))
            .collect();
        assert_eq!(names, [&MountOption::FSName("homes".into())]);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let err = mount_options(&set(&["bogus"]), Path::new("/h"), false).unwrap_err();
        assert!(matches!(err, UsermapError::InvalidOption { option } if option == "bogus"));
    }

    #[test]
    fn sloppy_drops_unknown_token() {
        let opts = mount_options(&set(&["bogus", "nosuid"]), Path::new("/h"), true)
            .unwrap()
            .options;
        assert_eq!(opts[0], MountOption::NoSuid);
        assert_eq!(opts.len(), 3);
    }
}
