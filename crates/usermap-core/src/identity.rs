//! Identity and option resolution.
//!
//! Turns the positional source argument and the raw option string into
//! the identity the process will assume, the directory it will be
//! confined to, and the options left for the FUSE layer. Nothing here
//! changes process state.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use nix::unistd::{Gid, Uid};
use usermap_common::error::{Result, UsermapError};

use crate::directory::IdentityDirectory;
use crate::options::{OptionSet, parse_options};

/// The identity being impersonated and the tree being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Login name of the source user (needed for supplementary groups).
    pub source_user: String,
    /// Directory the process will be confined to.
    pub source_path: PathBuf,
    /// User id assumed for every file access.
    pub source_uid: Uid,
    /// Group id assumed for every file access.
    pub source_gid: Gid,
    /// Owner the mount presents files as (`user=`), if overridden.
    pub mapped_uid: Option<Uid>,
    /// Group the mount presents files as (`user=`/`group=`), if overridden.
    pub mapped_gid: Option<Gid>,
}

impl ResolvedIdentity {
    /// Mount options carrying the mount-visible owner override.
    ///
    /// These are plain `uid=N`/`gid=N` options; they play no part in
    /// containment. Id 0 is never mapped, so `user=root` leaves stored
    /// ownership visible.
    #[must_use]
    pub fn mapped_options(&self) -> Vec<String> {
        let mut opts = Vec::with_capacity(2);
        if let Some(uid) = self.mapped_uid.filter(|uid| !uid.is_root()) {
            opts.push(format!("uid={uid}"));
        }
        if let Some(gid) = self.mapped_gid.filter(|gid| gid.as_raw() != 0) {
            opts.push(format!("gid={gid}"));
        }
        opts
    }

    /// Passthrough options followed by the mapped owner options.
    #[must_use]
    pub fn mount_options(&self, passthrough: &OptionSet) -> OptionSet {
        passthrough
            .iter()
            .map(str::to_owned)
            .chain(self.mapped_options())
            .collect()
    }
}

/// Resolves the source identity and the passthrough option set.
///
/// `source` is either an absolute directory path or a bare username;
/// `raw_options` is the merged, comma-separated `-o` string.
///
/// # Errors
///
/// Returns an error if a named user or group is unknown, if `source` and
/// `source_user=` disagree, if an absolute source is given without
/// `source_user=`, or if the source directory is missing or not a
/// directory.
pub fn resolve(
    source: &str,
    raw_options: &str,
    directory: &impl IdentityDirectory,
) -> Result<(ResolvedIdentity, OptionSet)> {
    let parsed = parse_options(raw_options);
    let source_is_path = Path::new(source).is_absolute();

    let source_user = if source_is_path {
        parsed
            .source_user
            .clone()
            .ok_or_else(|| UsermapError::MissingSourceUser {
                path: PathBuf::from(source),
            })?
    } else {
        match parsed.source_user.as_deref() {
            Some(option) if option != source => {
                return Err(UsermapError::IdentityMismatch {
                    source_name: source.to_owned(),
                    option: option.to_owned(),
                });
            }
            _ => source.to_owned(),
        }
    };

    let record = directory
        .user_by_name(&source_user)?
        .ok_or_else(|| UsermapError::UnknownUser {
            name: source_user.clone(),
        })?;

    let source_path = if source_is_path {
        PathBuf::from(source)
    } else {
        record.home.clone()
    };

    let mut source_gid = record.gid;
    if let Some(name) = parsed.source_group.as_deref() {
        source_gid = lookup_gid(name, directory)?;
    }

    let mut mapped_uid = None;
    let mut mapped_gid = None;
    if let Some(name) = parsed.user.as_deref() {
        let mapped = directory
            .user_by_name(name)?
            .ok_or_else(|| UsermapError::UnknownUser {
                name: name.to_owned(),
            })?;
        mapped_uid = Some(mapped.uid);
        mapped_gid = Some(mapped.gid);
    }
    if let Some(name) = parsed.group.as_deref() {
        mapped_gid = Some(lookup_gid(name, directory)?);
    }

    verify_directory(&source_path)?;

    let identity = ResolvedIdentity {
        source_user,
        source_path,
        source_uid: record.uid,
        source_gid,
        mapped_uid,
        mapped_gid,
    };
    tracing::info!(
        user = %identity.source_user,
        uid = %identity.source_uid,
        gid = %identity.source_gid,
        path = %identity.source_path.display(),
        "resolved source identity"
    );
    Ok((identity, parsed.passthrough))
}

fn lookup_gid(name: &str, directory: &impl IdentityDirectory) -> Result<Gid> {
    directory
        .group_by_name(name)?
        .map(|g| g.gid)
        .ok_or_else(|| UsermapError::UnknownGroup {
            name: name.to_owned(),
        })
}

fn verify_directory(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => UsermapError::SourceMissing {
            path: path.to_path_buf(),
        },
        _ => UsermapError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    if !meta.is_dir() {
        return Err(UsermapError::NotADirectory {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}
