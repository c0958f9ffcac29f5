//! Access to the system identity directory (passwd and group databases).

use std::path::PathBuf;

use nix::unistd::{Gid, Group, Uid, User};
use usermap_common::error::{Result, UsermapError};

/// A passwd entry, reduced to what containment needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Login name.
    pub name: String,
    /// Numeric user id.
    pub uid: Uid,
    /// Primary group id.
    pub gid: Gid,
    /// Home directory.
    pub home: PathBuf,
}

/// A group entry, reduced to its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    /// Group name.
    pub name: String,
    /// Numeric group id.
    pub gid: Gid,
}

/// Lookup interface over the user and group databases.
///
/// `Ok(None)` means the name is not known; `Err` means the database
/// itself could not be consulted.
pub trait IdentityDirectory {
    /// Looks up a user by login name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    fn user_by_name(&self, name: &str) -> Result<Option<UserRecord>>;

    /// Looks up a group by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be queried.
    fn group_by_name(&self, name: &str) -> Result<Option<GroupRecord>>;
}

/// The host's NSS-backed directory (`getpwnam_r`/`getgrnam_r`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDirectory;

impl IdentityDirectory for SystemDirectory {
    fn user_by_name(&self, name: &str) -> Result<Option<UserRecord>> {
        let user = User::from_name(name).map_err(|e| UsermapError::Lookup {
            name: name.to_owned(),
            source: e.into(),
        })?;
        Ok(user.map(|u| UserRecord {
            name: u.name,
            uid: u.uid,
            gid: u.gid,
            home: u.dir,
        }))
    }

    fn group_by_name(&self, name: &str) -> Result<Option<GroupRecord>> {
        let group = Group::from_name(name).map_err(|e| UsermapError::Lookup {
            name: name.to_owned(),
            source: e.into(),
        })?;
        Ok(group.map(|g| GroupRecord {
            name: g.name,
            gid: g.gid,
        }))
    }
}
