//! The closed set of filesystem operations and their results.
//!
//! Paths are absolute within the served tree. Each operation borrows its
//! arguments from the request that carried it.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::Path;
use std::time::SystemTime;

/// Coarse file type, as reported by a directory entry's type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Named pipe.
    NamedPipe,
    /// Character device.
    CharDevice,
    /// Directory.
    Directory,
    /// Block device.
    BlockDevice,
    /// Regular file.
    RegularFile,
    /// Symbolic link.
    Symlink,
    /// Unix domain socket.
    Socket,
    /// The filesystem did not report a type.
    Unknown,
}

impl EntryKind {
    /// Derives the kind from the `S_IFMT` bits of a mode.
    #[must_use]
    pub const fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT {
            libc::S_IFIFO => Self::NamedPipe,
            libc::S_IFCHR => Self::CharDevice,
            libc::S_IFDIR => Self::Directory,
            libc::S_IFBLK => Self::BlockDevice,
            libc::S_IFREG => Self::RegularFile,
            libc::S_IFLNK => Self::Symlink,
            libc::S_IFSOCK => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// One entry produced by a directory listing.
///
/// Only the identifier, name and coarse type are meaningful; listings do
/// not stat each entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Inode number reported by the underlying filesystem.
    pub ino: u64,
    /// Offset of the entry that follows this one.
    pub next_offset: i64,
    /// Coarse type.
    pub kind: EntryKind,
    /// Entry name.
    pub name: OsString,
}

/// Attributes of a node, as reported by `lstat(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    /// Inode number on the underlying filesystem.
    pub ino: u64,
    /// Full mode, type bits included.
    pub mode: u32,
    /// Hard link count.
    pub nlink: u64,
    /// Owner.
    pub uid: u32,
    /// Group.
    pub gid: u32,
    /// Device number, for device nodes.
    pub rdev: u64,
    /// Size in bytes.
    pub size: u64,
    /// Allocated 512-byte blocks.
    pub blocks: u64,
    /// Preferred I/O block size.
    pub blksize: u64,
    /// Last access.
    pub atime: SystemTime,
    /// Last modification.
    pub mtime: SystemTime,
    /// Last status change.
    pub ctime: SystemTime,
}

impl Attributes {
    /// Coarse type of the node.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        EntryKind::from_mode(self.mode)
    }

    /// Permission bits (including setuid, setgid and sticky).
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// Filesystem statistics, as reported by `statvfs(3)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    /// Total blocks, in `fragment_size` units.
    pub blocks: u64,
    /// Free blocks.
    pub blocks_free: u64,
    /// Free blocks available to unprivileged users.
    pub blocks_available: u64,
    /// Total inodes.
    pub files: u64,
    /// Free inodes.
    pub files_free: u64,
    /// Block size.
    pub block_size: u64,
    /// Fragment size.
    pub fragment_size: u64,
    /// Maximum file name length.
    pub name_max: u64,
}

/// New value for one timestamp of a time-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Leave the timestamp unchanged.
    Omit,
    /// Set it to the current time.
    Now,
    /// Set it to the given instant.
    At(SystemTime),
}

/// Consumer of directory entries; returns `true` to stop enumeration.
pub type DirFiller<'a> = dyn FnMut(DirEntry) -> bool + 'a;

/// A filesystem operation.
pub enum Operation<'a> {
    /// `lstat(2)`.
    GetAttr {
        /// Target path.
        path: &'a Path,
    },
    /// `access(2)`.
    Access {
        /// Target path.
        path: &'a Path,
        /// `R_OK`/`W_OK`/`X_OK`/`F_OK` mask.
        mask: i32,
    },
    /// `readlink(2)`.
    ReadLink {
        /// Link path.
        path: &'a Path,
    },
    /// Directory enumeration, starting after `offset` entries.
    ReadDir {
        /// Directory path.
        path: &'a Path,
        /// Number of entries already consumed.
        offset: i64,
        /// Receives entries until it asks to stop.
        filler: &'a mut DirFiller<'a>,
    },
    /// Node creation (regular file, pipe, or device).
    MkNod {
        /// New node path.
        path: &'a Path,
        /// Type and permission bits.
        mode: u32,
        /// Device number.
        rdev: u64,
    },
    /// `mkdir(2)`.
    MkDir {
        /// New directory path.
        path: &'a Path,
        /// Permission bits.
        mode: u32,
    },
    /// `unlink(2)`.
    Unlink {
        /// Path to remove.
        path: &'a Path,
    },
    /// `rmdir(2)`.
    RmDir {
        /// Directory to remove.
        path: &'a Path,
    },
    /// `symlink(2)`.
    Symlink {
        /// Link contents.
        target: &'a Path,
        /// Path of the new link.
        link: &'a Path,
    },
    /// `rename(2)`.
    Rename {
        /// Existing path.
        from: &'a Path,
        /// New path.
        to: &'a Path,
    },
    /// `link(2)`.
    Link {
        /// Existing path.
        from: &'a Path,
        /// New path.
        to: &'a Path,
    },
    /// `chmod(2)`.
    Chmod {
        /// Target path.
        path: &'a Path,
        /// New permission bits.
        mode: u32,
    },
    /// `lchown(2)`; `None` leaves that id unchanged.
    Chown {
        /// Target path.
        path: &'a Path,
        /// New owner.
        uid: Option<u32>,
        /// New group.
        gid: Option<u32>,
    },
    /// `truncate(2)`.
    Truncate {
        /// Target path.
        path: &'a Path,
        /// New size.
        size: u64,
    },
    /// `utimensat(2)`, following symlinks.
    Utime {
        /// Target path.
        path: &'a Path,
        /// New access time.
        atime: Timestamp,
        /// New modification time.
        mtime: Timestamp,
    },
    /// Open-and-close validation of `flags`.
    Open {
        /// Target path.
        path: &'a Path,
        /// `open(2)` flags.
        flags: i32,
    },
    /// `pread(2)` on a fresh descriptor.
    Read {
        /// Target path.
        path: &'a Path,
        /// Byte offset.
        offset: i64,
        /// Maximum bytes to read.
        size: u32,
    },
    /// `pwrite(2)` on a fresh descriptor.
    Write {
        /// Target path.
        path: &'a Path,
        /// Byte offset.
        offset: i64,
        /// Bytes to write.
        data: &'a [u8],
    },
    /// `statvfs(3)`.
    StatFs {
        /// Any path on the filesystem.
        path: &'a Path,
    },
    /// Handle release; there is no handle state.
    Release {
        /// Target path.
        path: &'a Path,
    },
    /// Sync request; there is nothing buffered.
    Sync {
        /// Target path.
        path: &'a Path,
        /// Only data, not metadata, was requested.
        datasync: bool,
    },
    /// `lgetxattr(2)`; `size == 0` queries the value length.
    #[cfg(feature = "xattr")]
    GetXattr {
        /// Target path.
        path: &'a Path,
        /// Attribute name.
        name: &'a OsStr,
        /// Caller's buffer size.
        size: u32,
    },
    /// `lsetxattr(2)`.
    #[cfg(feature = "xattr")]
    SetXattr {
        /// Target path.
        path: &'a Path,
        /// Attribute name.
        name: &'a OsStr,
        /// Attribute value.
        value: &'a [u8],
        /// `XATTR_CREATE`/`XATTR_REPLACE`.
        flags: i32,
    },
    /// `llistxattr(2)`; `size == 0` queries the list length.
    #[cfg(feature = "xattr")]
    ListXattr {
        /// Target path.
        path: &'a Path,
        /// Caller's buffer size.
        size: u32,
    },
    /// `lremovexattr(2)`.
    #[cfg(feature = "xattr")]
    RemoveXattr {
        /// Target path.
        path: &'a Path,
        /// Attribute name.
        name: &'a OsStr,
    },
}

impl Operation<'_> {
    /// Short name used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetAttr { .. } => "getattr",
            Self::Access { .. } => "access",
            Self::ReadLink { .. } => "readlink",
            Self::ReadDir { .. } => "readdir",
            Self::MkNod { .. } => "mknod",
            Self::MkDir { .. } => "mkdir",
            Self::Unlink { .. } => "unlink",
            Self::RmDir { .. } => "rmdir",
            Self::Symlink { .. } => "symlink",
            Self::Rename { .. } => "rename",
            Self::Link { .. } => "link",
            Self::Chmod { .. } => "chmod",
            Self::Chown { .. } => "chown",
            Self::Truncate { .. } => "truncate",
            Self::Utime { .. } => "utime",
            Self::Open { .. } => "open",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::StatFs { .. } => "statfs",
            Self::Release { .. } => "release",
            Self::Sync { .. } => "fsync",
            #[cfg(feature = "xattr")]
            Self::GetXattr { .. } => "getxattr",
            #[cfg(feature = "xattr")]
            Self::SetXattr { .. } => "setxattr",
            #[cfg(feature = "xattr")]
            Self::ListXattr { .. } => "listxattr",
            #[cfg(feature = "xattr")]
            Self::RemoveXattr { .. } => "removexattr",
        }
    }

    /// The primary path the operation acts on.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::GetAttr { path }
            | Self::Access { path, .. }
            | Self::ReadLink { path }
            | Self::ReadDir { path, .. }
            | Self::MkNod { path, .. }
            | Self::MkDir { path, .. }
            | Self::Unlink { path }
            | Self::RmDir { path }
            | Self::Chmod { path, .. }
            | Self::Chown { path, .. }
            | Self::Truncate { path, .. }
            | Self::Utime { path, .. }
            | Self::Open { path, .. }
            | Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::StatFs { path }
            | Self::Release { path }
            | Self::Sync { path, .. } => path,
            Self::Symlink { link, .. } => link,
            Self::Rename { from, .. } | Self::Link { from, .. } => from,
            #[cfg(feature = "xattr")]
            Self::GetXattr { path, .. }
            | Self::SetXattr { path, .. }
            | Self::ListXattr { path, .. }
            | Self::RemoveXattr { path, .. } => path,
        }
    }
}

impl fmt::Debug for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name())
            .field("path", &self.path())
            .finish_non_exhaustive()
    }
}

/// Successful result of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to return.
    Done,
    /// Node attributes.
    Attr(Attributes),
    /// Symbolic link contents.
    Link(OsString),
    /// Bytes read.
    Data(Vec<u8>),
    /// Number of bytes written.
    Written(usize),
    /// Filesystem statistics.
    StatFs(FsStats),
    /// Length needed to hold an attribute value or name list.
    XattrSize(u32),
    /// Attribute value or name list.
    XattrData(Vec<u8>),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_mode_reads_type_bits() {
        assert_eq!(EntryKind::from_mode(libc::S_IFDIR | 0o755), EntryKind::Directory);
        assert_eq!(EntryKind::from_mode(libc::S_IFIFO | 0o600), EntryKind::NamedPipe);
        assert_eq!(EntryKind::from_mode(0o644), EntryKind::Unknown);
    }

    #[test]
    fn symlink_reports_link_path() {
        let op = Operation::Symlink {
            target: Path::new("target"),
            link: Path::new("/link"),
        };
        assert_eq!(op.name(), "symlink");
        assert_eq!(op.path(), Path::new("/link"));
    }
}
