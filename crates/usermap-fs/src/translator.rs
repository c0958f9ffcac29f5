//! Passthrough operation translator.
//!
//! Each [`Operation`] becomes the equivalent local system call on the
//! served tree. Nothing is cached and nothing is retried: every call opens
//! what it needs, closes it before returning, and reports the `errno` of
//! the first failing call.
//!
//! Once the process is confined the translator runs with root `/`, and
//! the kernel's root change is what keeps every path inside the source
//! directory. Paths are additionally normalised lexically, so `..` can
//! never climb above the root even when the translator is pointed at an
//! ordinary directory.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions, Permissions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::dir::{Dir, Type};
use nix::fcntl::{AT_FDCWD, OFlag};
use nix::sys::stat::{Mode, SFlag, UtimensatFlags, utimensat};
use nix::sys::time::TimeSpec;
use nix::unistd::AccessFlags;

use crate::errno::{Code, ErrorKind, OpResult};
use crate::operation::{
    Attributes, DirEntry, DirFiller, EntryKind, FsStats, Operation, Reply, Timestamp,
};

/// Executes filesystem operations against a local directory tree.
#[derive(Debug, Clone)]
pub struct Translator {
    root: PathBuf,
}

impl Translator {
    /// Creates a translator serving the tree under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Translator for a chrooted process: the served tree is `/`.
    #[must_use]
    pub fn confined() -> Self {
        Self::new("/")
    }

    /// Root of the served tree.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a served path onto the local filesystem.
    ///
    /// `.` is dropped and `..` is applied lexically, stopping at the root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let mut resolved = self.root.clone();
        let mut depth = 0_usize;
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    let _ = resolved.pop();
                    depth -= 1;
                }
                Component::ParentDir
                | Component::RootDir
                | Component::CurDir
                | Component::Prefix(_) => {}
            }
        }
        resolved
    }

    /// Runs one operation.
    ///
    /// # Errors
    ///
    /// Returns the [`ErrorKind`] of the local call that failed.
    pub fn dispatch(&self, op: Operation<'_>) -> OpResult<Reply> {
        let name = op.name();
        tracing::trace!(op = name, path = %op.path().display(), "dispatch");
        let result = match op {
            Operation::GetAttr { path } => self.getattr(path).map(Reply::Attr),
            Operation::Access { path, mask } => self.access(path, mask).map(|()| Reply::Done),
            Operation::ReadLink { path } => self.readlink(path).map(Reply::Link),
            Operation::ReadDir {
                path,
                offset,
                filler,
            } => self.readdir(path, offset, filler).map(|()| Reply::Done),
            Operation::MkNod { path, mode, rdev } => {
                self.mknod(path, mode, rdev).map(|()| Reply::Done)
            }
            Operation::MkDir { path, mode } => self.mkdir(path, mode).map(|()| Reply::Done),
            Operation::Unlink { path } => self.unlink(path).map(|()| Reply::Done),
            Operation::RmDir { path } => self.rmdir(path).map(|()| Reply::Done),
            Operation::Symlink { target, link } => {
                self.symlink(target, link).map(|()| Reply::Done)
            }
            Operation::Rename { from, to } => self.rename(from, to).map(|()| Reply::Done),
            Operation::Link { from, to } => self.link(from, to).map(|()| Reply::Done),
            Operation::Chmod { path, mode } => self.chmod(path, mode).map(|()| Reply::Done),
            Operation::Chown { path, uid, gid } => {
                self.chown(path, uid, gid).map(|()| Reply::Done)
            }
            Operation::Truncate { path, size } => self.truncate(path, size).map(|()| Reply::Done),
            Operation::Utime { path, atime, mtime } => {
                self.utime(path, atime, mtime).map(|()| Reply::Done)
            }
            Operation::Open { path, flags } => self.open(path, flags).map(|()| Reply::Done),
            Operation::Read { path, offset, size } => {
                self.read(path, offset, size).map(Reply::Data)
            }
            Operation::Write { path, offset, data } => {
                self.write(path, offset, data).map(Reply::Written)
            }
            Operation::StatFs { path } => self.statfs(path).map(Reply::StatFs),
            Operation::Release { .. } | Operation::Sync { .. } => Ok(Reply::Done),
            #[cfg(feature = "xattr")]
            Operation::GetXattr { path, name, size } => {
                crate::xattr::get(&self.resolve(path), name, size)
            }
            #[cfg(feature = "xattr")]
            Operation::SetXattr {
                path,
                name,
                value,
                flags,
            } => crate::xattr::set(&self.resolve(path), name, value, flags).map(|()| Reply::Done),
            #[cfg(feature = "xattr")]
            Operation::ListXattr { path, size } => crate::xattr::list(&self.resolve(path), size),
            #[cfg(feature = "xattr")]
            Operation::RemoveXattr { path, name } => {
                crate::xattr::remove(&self.resolve(path), name).map(|()| Reply::Done)
            }
        };
        if let Err(kind) = result {
            tracing::debug!(op = name, error = %Code(kind), "operation failed");
        }
        result
    }

    /// Attribute query; does not follow a final symlink.
    ///
    /// # Errors
    ///
    /// Returns the `lstat(2)` error.
    pub fn getattr(&self, path: &Path) -> OpResult<Attributes> {
        let meta = std::fs::symlink_metadata(self.resolve(path))?;
        Ok(Attributes {
            ino: meta.ino(),
            mode: meta.mode(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
            rdev: meta.rdev(),
            size: meta.size(),
            blocks: meta.blocks(),
            blksize: meta.blksize(),
            atime: system_time(meta.atime(), meta.atime_nsec()),
            mtime: system_time(meta.mtime(), meta.mtime_nsec()),
            ctime: system_time(meta.ctime(), meta.ctime_nsec()),
        })
    }

    /// Permission check for the current identity.
    ///
    /// # Errors
    ///
    /// Returns the `access(2)` error.
    pub fn access(&self, path: &Path, mask: i32) -> OpResult<()> {
        nix::unistd::access(&self.resolve(path), AccessFlags::from_bits_truncate(mask))?;
        Ok(())
    }

    /// Reads a symbolic link's contents.
    ///
    /// # Errors
    ///
    /// Returns the `readlink(2)` error.
    pub fn readlink(&self, path: &Path) -> OpResult<std::ffi::OsString> {
        Ok(std::fs::read_link(self.resolve(path))?.into_os_string())
    }

    /// Enumerates a directory, skipping the first `offset` entries.
    ///
    /// Entries carry only the inode number, name and the type from the
    /// directory entry itself. Enumeration stops as soon as `filler`
    /// returns `true`.
    ///
    /// # Errors
    ///
    /// Returns the `opendir(3)` or `readdir(3)` error.
    pub fn readdir(&self, path: &Path, offset: i64, filler: &mut DirFiller<'_>) -> OpResult<()> {
        let skip = usize::try_from(offset).map_err(|_| ErrorKind::InvalidArgument)?;
        let mut dir = Dir::open(
            &self.resolve(path),
            OFlag::O_RDONLY | OFlag::O_DIRECTORY,
            Mode::empty(),
        )?;
        for (index, entry) in dir.iter().enumerate().skip(skip) {
            let entry = entry?;
            let next_offset = i64::try_from(index + 1).map_err(|_| ErrorKind::Range)?;
            let item = DirEntry {
                ino: entry.ino(),
                next_offset,
                kind: entry.file_type().map_or(EntryKind::Unknown, entry_kind),
                name: OsStr::from_bytes(entry.file_name().to_bytes()).to_os_string(),
            };
            if filler(item) {
                break;
            }
        }
        Ok(())
    }

    /// Creates a filesystem node without relying on raw `mknod(2)` for
    /// regular files or pipes.
    ///
    /// Regular files are created exclusively and closed; pipes use
    /// `mkfifo(3)`; anything else falls through to `mknod(2)`.
    ///
    /// # Errors
    ///
    /// Returns the error of the creating call.
    pub fn mknod(&self, path: &Path, mode: u32, rdev: u64) -> OpResult<()> {
        let target = self.resolve(path);
        match mode & libc::S_IFMT {
            libc::S_IFREG => {
                let _file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .mode(mode)
                    .open(&target)?;
            }
            libc::S_IFIFO => nix::unistd::mkfifo(&target, Mode::from_bits_truncate(mode))?,
            kind => nix::sys::stat::mknod(
                &target,
                SFlag::from_bits_truncate(kind),
                Mode::from_bits_truncate(mode),
                rdev,
            )?,
        }
        Ok(())
    }

    /// Creates a directory.
    ///
    /// # Errors
    ///
    /// Returns the `mkdir(2)` error.
    pub fn mkdir(&self, path: &Path, mode: u32) -> OpResult<()> {
        nix::unistd::mkdir(&self.resolve(path), Mode::from_bits_truncate(mode))?;
        Ok(())
    }

    /// Removes a non-directory.
    ///
    /// # Errors
    ///
    /// Returns the `unlink(2)` error.
    pub fn unlink(&self, path: &Path) -> OpResult<()> {
        nix::unistd::unlink(&self.resolve(path))?;
        Ok(())
    }

    /// Removes an empty directory.
    ///
    /// # Errors
    ///
    /// Returns the `rmdir(2)` error.
    pub fn rmdir(&self, path: &Path) -> OpResult<()> {
        std::fs::remove_dir(self.resolve(path))?;
        Ok(())
    }

    /// Creates `link` pointing at `target`; the target is stored verbatim.
    ///
    /// # Errors
    ///
    /// Returns the `symlink(2)` error.
    pub fn symlink(&self, target: &Path, link: &Path) -> OpResult<()> {
        std::os::unix::fs::symlink(target, self.resolve(link))?;
        Ok(())
    }

    /// Renames `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns the `rename(2)` error.
    pub fn rename(&self, from: &Path, to: &Path) -> OpResult<()> {
        std::fs::rename(self.resolve(from), self.resolve(to))?;
        Ok(())
    }

    /// Creates a hard link `to` for `from`.
    ///
    /// # Errors
    ///
    /// Returns the `link(2)` error.
    pub fn link(&self, from: &Path, to: &Path) -> OpResult<()> {
        std::fs::hard_link(self.resolve(from), self.resolve(to))?;
        Ok(())
    }

    /// Changes permission bits.
    ///
    /// # Errors
    ///
    /// Returns the `chmod(2)` error.
    pub fn chmod(&self, path: &Path, mode: u32) -> OpResult<()> {
        std::fs::set_permissions(self.resolve(path), Permissions::from_mode(mode))?;
        Ok(())
    }

    /// Changes ownership of the node itself, never a link's target.
    ///
    /// # Errors
    ///
    /// Returns the `lchown(2)` error.
    pub fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> OpResult<()> {
        std::os::unix::fs::lchown(self.resolve(path), uid, gid)?;
        Ok(())
    }

    /// Sets a file's length.
    ///
    /// # Errors
    ///
    /// Returns the `truncate(2)` error.
    pub fn truncate(&self, path: &Path, size: u64) -> OpResult<()> {
        let len = i64::try_from(size).map_err(|_| ErrorKind::InvalidArgument)?;
        nix::unistd::truncate(&self.resolve(path), len)?;
        Ok(())
    }

    /// Updates access and modification times.
    ///
    /// # Errors
    ///
    /// Returns the `utimensat(2)` error.
    pub fn utime(&self, path: &Path, atime: Timestamp, mtime: Timestamp) -> OpResult<()> {
        utimensat(
            AT_FDCWD,
            &self.resolve(path),
            &timespec(atime),
            &timespec(mtime),
            UtimensatFlags::FollowSymlink,
        )?;
        Ok(())
    }

    /// Validates that `path` can be opened with `flags`.
    ///
    /// The descriptor is closed immediately; no handle is kept.
    ///
    /// # Errors
    ///
    /// Returns the `open(2)` error.
    pub fn open(&self, path: &Path, flags: i32) -> OpResult<()> {
        let mut options = OpenOptions::new();
        match flags & libc::O_ACCMODE {
            libc::O_WRONLY => options.write(true),
            libc::O_RDWR => options.read(true).write(true),
            _ => options.read(true),
        };
        let _file = options
            .custom_flags(flags & !libc::O_ACCMODE)
            .open(self.resolve(path))?;
        Ok(())
    }

    /// Reads up to `size` bytes at `offset` with one `pread(2)`.
    ///
    /// Reading at or past end-of-file yields an empty buffer. Short reads
    /// are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns the `open(2)` or `pread(2)` error.
    pub fn read(&self, path: &Path, offset: i64, size: u32) -> OpResult<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| ErrorKind::InvalidArgument)?;
        let file = File::open(self.resolve(path))?;
        let mut buf = vec![0_u8; size as usize];
        let n = file.read_at(&mut buf, offset)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Writes `data` at `offset` with one `pwrite(2)`.
    ///
    /// Returns the number of bytes the kernel accepted, which may be short.
    ///
    /// # Errors
    ///
    /// Returns the `open(2)` or `pwrite(2)` error.
    pub fn write(&self, path: &Path, offset: i64, data: &[u8]) -> OpResult<usize> {
        let offset = u64::try_from(offset).map_err(|_| ErrorKind::InvalidArgument)?;
        let file = OpenOptions::new().write(true).open(self.resolve(path))?;
        Ok(file.write_at(data, offset)?)
    }

    /// Filesystem statistics for the filesystem holding `path`.
    ///
    /// # Errors
    ///
    /// Returns the `statvfs(3)` error.
    pub fn statfs(&self, path: &Path) -> OpResult<FsStats> {
        let st = nix::sys::statvfs::statvfs(&self.resolve(path))?;
        Ok(FsStats {
            blocks: u64::from(st.blocks()),
            blocks_free: u64::from(st.blocks_free()),
            blocks_available: u64::from(st.blocks_available()),
            files: u64::from(st.files()),
            files_free: u64::from(st.files_free()),
            block_size: u64::from(st.block_size()),
            fragment_size: u64::from(st.fragment_size()),
            name_max: u64::from(st.name_max()),
        })
    }
}

const fn entry_kind(kind: Type) -> EntryKind {
    match kind {
        Type::Fifo => EntryKind::NamedPipe,
        Type::CharacterDevice => EntryKind::CharDevice,
        Type::Directory => EntryKind::Directory,
        Type::BlockDevice => EntryKind::BlockDevice,
        Type::File => EntryKind::RegularFile,
        Type::Symlink => EntryKind::Symlink,
        Type::Socket => EntryKind::Socket,
    }
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
fn system_time(secs: i64, nsecs: i64) -> SystemTime {
    let nanos = Duration::from_nanos(nsecs.clamp(0, 999_999_999) as u64);
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64) + nanos
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs()) + nanos
    }
}

fn timespec(ts: Timestamp) -> TimeSpec {
    match ts {
        Timestamp::Omit => TimeSpec::UTIME_OMIT,
        Timestamp::Now => TimeSpec::UTIME_NOW,
        Timestamp::At(at) => match at.duration_since(UNIX_EPOCH) {
            Ok(since) => TimeSpec::from(since),
            Err(before) => -TimeSpec::from(before.duration()),
        },
    }
}
