//! FUSE boundary.
//!
//! [`UsermapFs`] receives kernel requests through `fuser`, turns them into
//! [`Operation`]s on paths, runs them through the [`Translator`] and
//! writes the result back. Failures cross the boundary only as `errno`
//! values.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use usermap_common::constants::ATTR_TTL;

use crate::errno::{ErrorKind, OpResult};
use crate::inode::InodeTable;
use crate::operation::{Attributes, DirEntry, EntryKind, Operation, Reply, Timestamp};
use crate::translator::Translator;

/// Owner and group reported for every node in place of the stored ones.
///
/// Set from the `uid=`/`gid=` mount options. Only replies change; files
/// on disk keep their real owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerOverride {
    /// Reported owner.
    pub uid: Option<u32>,
    /// Reported group.
    pub gid: Option<u32>,
}

/// The served filesystem: a translator plus the node-number table the
/// kernel protocol requires.
#[derive(Debug)]
pub struct UsermapFs {
    translator: Translator,
    inodes: InodeTable,
    owner: OwnerOverride,
}

impl UsermapFs {
    /// Serves the tree the translator is rooted at, reporting ownership
    /// through `owner`.
    #[must_use]
    pub fn new(translator: Translator, owner: OwnerOverride) -> Self {
        Self {
            translator,
            inodes: InodeTable::new(),
            owner,
        }
    }

    fn file_attr(&self, ino: u64, attr: &Attributes) -> FileAttr {
        let mut out = file_attr(ino, attr);
        if let Some(uid) = self.owner.uid {
            out.uid = uid;
        }
        if let Some(gid) = self.owner.gid {
            out.gid = gid;
        }
        out
    }

    fn path(&self, ino: u64) -> OpResult<PathBuf> {
        self.inodes
            .path(ino)
            .map(Path::to_path_buf)
            .ok_or(ErrorKind::NotFound)
    }

    fn child(&self, parent: u64, name: &OsStr) -> OpResult<PathBuf> {
        self.inodes.child(parent, name).ok_or(ErrorKind::NotFound)
    }

    fn attributes(&self, path: &Path) -> OpResult<Attributes> {
        match self.translator.dispatch(Operation::GetAttr { path })? {
            Reply::Attr(attr) => Ok(attr),
            _ => Err(ErrorKind::Io),
        }
    }

    fn run(&self, op: Operation<'_>) -> OpResult<()> {
        self.translator.dispatch(op).map(|_| ())
    }

    /// Replies with a fresh node entry for `path`.
    fn entry(&mut self, path: &Path, reply: ReplyEntry) {
        match self.attributes(path) {
            Ok(attr) => {
                let ino = self.inodes.lookup(path);
                reply.entry(&ATTR_TTL, &self.file_attr(ino, &attr), 0);
            }
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn set_attributes(&self, path: &Path, change: &AttrChange) -> OpResult<Attributes> {
        if let Some(mode) = change.mode {
            self.run(Operation::Chmod { path, mode })?;
        }
        if change.uid.is_some() || change.gid.is_some() {
            self.run(Operation::Chown {
                path,
                uid: change.uid,
                gid: change.gid,
            })?;
        }
        if let Some(size) = change.size {
            self.run(Operation::Truncate { path, size })?;
        }
        if change.atime.is_some() || change.mtime.is_some() {
            self.run(Operation::Utime {
                path,
                atime: timestamp(change.atime),
                mtime: timestamp(change.mtime),
            })?;
        }
        self.attributes(path)
    }
}

/// The parts of a `setattr` request that map onto local calls.
struct AttrChange {
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
    size: Option<u64>,
    atime: Option<TimeOrNow>,
    mtime: Option<TimeOrNow>,
}

const fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::NamedPipe => FileType::NamedPipe,
        EntryKind::CharDevice => FileType::CharDevice,
        EntryKind::Directory => FileType::Directory,
        EntryKind::BlockDevice => FileType::BlockDevice,
        EntryKind::Symlink => FileType::Symlink,
        EntryKind::Socket => FileType::Socket,
        EntryKind::RegularFile | EntryKind::Unknown => FileType::RegularFile,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn file_attr(ino: u64, attr: &Attributes) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.blocks,
        atime: attr.atime,
        mtime: attr.mtime,
        ctime: attr.ctime,
        crtime: UNIX_EPOCH,
        kind: file_type(attr.kind()),
        perm: attr.permissions() as u16,
        nlink: u32::try_from(attr.nlink).unwrap_or(u32::MAX),
        uid: attr.uid,
        gid: attr.gid,
        // the protocol carries a 32-bit device number
        rdev: attr.rdev as u32,
        blksize: u32::try_from(attr.blksize).unwrap_or(u32::MAX),
        flags: 0,
    }
}

fn timestamp(time: Option<TimeOrNow>) -> Timestamp {
    match time {
        None => Timestamp::Omit,
        Some(TimeOrNow::Now) => Timestamp::Now,
        Some(TimeOrNow::SpecificTime(at)) => Timestamp::At(at),
    }
}

fn empty(result: OpResult<()>, reply: ReplyEmpty) {
    match result {
        Ok(()) => reply.ok(),
        Err(kind) => reply.error(kind.errno()),
    }
}

impl Filesystem for UsermapFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        tracing::info!(root = %self.translator.root().display(), "serving");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!(nodes = self.inodes.len(), "session torn down");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match self.child(parent, name) {
            Ok(path) => self.entry(&path, reply),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.path(ino).and_then(|path| self.attributes(&path)) {
            Ok(attr) => reply.attr(&ATTR_TTL, &self.file_attr(ino, &attr)),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let change = AttrChange {
            mode,
            uid,
            gid,
            size,
            atime,
            mtime,
        };
        match self
            .path(ino)
            .and_then(|path| self.set_attributes(&path, &change))
        {
            Ok(attr) => reply.attr(&ATTR_TTL, &self.file_attr(ino, &attr)),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn readlink(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyData) {
        let result = self
            .path(ino)
            .and_then(|path| self.translator.dispatch(Operation::ReadLink { path: &path }));
        match result {
            Ok(Reply::Link(target)) => reply.data(target.as_bytes()),
            Ok(_) => reply.error(libc::EIO),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        rdev: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child(parent, name).and_then(|path| {
            self.run(Operation::MkNod {
                path: &path,
                mode,
                rdev: u64::from(rdev),
            })
            .map(|()| path)
        });
        match result {
            Ok(path) => self.entry(&path, reply),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let result = self.child(parent, name).and_then(|path| {
            self.run(Operation::MkDir { path: &path, mode })
                .map(|()| path)
        });
        match result {
            Ok(path) => self.entry(&path, reply),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child(parent, name).and_then(|path| {
            self.run(Operation::Unlink { path: &path })?;
            self.inodes.unlink(&path);
            Ok(())
        });
        empty(result, reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self.child(parent, name).and_then(|path| {
            self.run(Operation::RmDir { path: &path })?;
            self.inodes.unlink(&path);
            Ok(())
        });
        empty(result, reply);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let result = self.child(parent, link_name).and_then(|link| {
            self.run(Operation::Symlink {
                target,
                link: &link,
            })
            .map(|()| link)
        });
        match result {
            Ok(link) => self.entry(&link, reply),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        if flags != 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let result = self.child(parent, name).and_then(|from| {
            let to = self.child(newparent, newname)?;
            self.run(Operation::Rename {
                from: &from,
                to: &to,
            })?;
            self.inodes.rename(&from, &to);
            Ok(())
        });
        empty(result, reply);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        newparent: u64,
        newname: &OsStr,
        reply: ReplyEntry,
    ) {
        let result = self.path(ino).and_then(|from| {
            let to = self.child(newparent, newname)?;
            self.run(Operation::Link {
                from: &from,
                to: &to,
            })?;
            Ok(to)
        });
        match result {
            Ok(to) => self.entry(&to, reply),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let result = self
            .path(ino)
            .and_then(|path| self.run(Operation::Open { path: &path, flags }));
        match result {
            Ok(()) => reply.opened(0, 0),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let result = self.path(ino).and_then(|path| {
            self.translator.dispatch(Operation::Read {
                path: &path,
                offset,
                size,
            })
        });
        match result {
            Ok(Reply::Data(data)) => reply.data(&data),
            Ok(_) => reply.error(libc::EIO),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let result = self.path(ino).and_then(|path| {
            self.translator.dispatch(Operation::Write {
                path: &path,
                offset,
                data,
            })
        });
        match result {
            Ok(Reply::Written(n)) => reply.written(u32::try_from(n).unwrap_or(u32::MAX)),
            Ok(_) => reply.error(libc::EIO),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let result = self
            .path(ino)
            .and_then(|path| self.run(Operation::Release { path: &path }));
        empty(result, reply);
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, datasync: bool, reply: ReplyEmpty) {
        let result = self.path(ino).and_then(|path| {
            self.run(Operation::Sync {
                path: &path,
                datasync,
            })
        });
        empty(result, reply);
    }

    fn opendir(&mut self, _req: &Request<'_>, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let path = match self.path(ino) {
            Ok(path) => path,
            Err(kind) => {
                reply.error(kind.errno());
                return;
            }
        };
        let result = {
            let mut fill = |entry: DirEntry| {
                reply.add(
                    entry.ino,
                    entry.next_offset,
                    file_type(entry.kind),
                    &entry.name,
                )
            };
            self.translator.dispatch(Operation::ReadDir {
                path: &path,
                offset,
                filler: &mut fill,
            })
        };
        match result {
            Ok(_) => reply.ok(),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn fsyncdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    #[allow(clippy::cast_possible_truncation)]
    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let result = self
            .path(ino)
            .and_then(|path| self.translator.dispatch(Operation::StatFs { path: &path }));
        match result {
            Ok(Reply::StatFs(st)) => reply.statfs(
                st.blocks,
                st.blocks_free,
                st.blocks_available,
                st.files,
                st.files_free,
                st.block_size as u32,
                st.name_max as u32,
                st.fragment_size as u32,
            ),
            Ok(_) => reply.error(libc::EIO),
            Err(kind) => reply.error(kind.errno()),
        }
    }

    #[cfg(feature = "xattr")]
    fn setxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        value: &[u8],
        flags: i32,
        _position: u32,
        reply: ReplyEmpty,
    ) {
        let result = self.path(ino).and_then(|path| {
            self.run(Operation::SetXattr {
                path: &path,
                name,
                value,
                flags,
            })
        });
        empty(result, reply);
    }

    #[cfg(feature = "xattr")]
    fn getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: fuser::ReplyXattr,
    ) {
        let result = self.path(ino).and_then(|path| {
            self.translator.dispatch(Operation::GetXattr {
                path: &path,
                name,
                size,
            })
        });
        xattr_reply(result, reply);
    }

    #[cfg(feature = "xattr")]
    fn listxattr(&mut self, _req: &Request<'_>, ino: u64, size: u32, reply: fuser::ReplyXattr) {
        let result = self.path(ino).and_then(|path| {
            self.translator
                .dispatch(Operation::ListXattr { path: &path, size })
        });
        xattr_reply(result, reply);
    }

    #[cfg(feature = "xattr")]
    fn removexattr(&mut self, _req: &Request<'_>, ino: u64, name: &OsStr, reply: ReplyEmpty) {
        let result = self
            .path(ino)
            .and_then(|path| self.run(Operation::RemoveXattr { path: &path, name }));
        empty(result, reply);
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let result = self
            .path(ino)
            .and_then(|path| self.run(Operation::Access { path: &path, mask }));
        empty(result, reply);
    }
}

#[cfg(feature = "xattr")]
fn xattr_reply(result: OpResult<Reply>, reply: fuser::ReplyXattr) {
    match result {
        Ok(Reply::XattrSize(len)) => reply.size(len),
        Ok(Reply::XattrData(data)) => reply.data(&data),
        Ok(_) => reply.error(libc::EIO),
        Err(kind) => reply.error(kind.errno()),
    }
}
