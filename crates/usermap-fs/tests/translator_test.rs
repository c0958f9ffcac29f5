//! Translator tests against a scratch directory standing in for the
//! confined root.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use tempfile::TempDir;
use usermap_fs::operation::{DirEntry, EntryKind, Timestamp};
use usermap_fs::{ErrorKind, Operation, Reply, Translator};

fn scratch() -> (TempDir, Translator) {
    let dir = tempfile::tempdir().expect("tempdir");
    let translator = Translator::new(dir.path());
    (dir, translator)
}

fn list(translator: &Translator, path: &str, offset: i64) -> Vec<DirEntry> {
    let mut seen = Vec::new();
    translator
        .readdir(Path::new(path), offset, &mut |entry| {
            seen.push(entry);
            false
        })
        .expect("readdir");
    seen
}

// ── Error fidelity ───────────────────────────────────────────────────

#[test]
fn missing_path_reports_enoent_for_every_family() {
    let (_dir, t) = scratch();
    let missing = Path::new("/nope");

    assert_eq!(t.getattr(missing).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.readlink(missing).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.unlink(missing).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.rmdir(missing).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.chmod(missing, 0o644).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.truncate(missing, 0).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.open(missing, libc::O_RDONLY).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.read(missing, 0, 16).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.write(missing, 0, b"x").unwrap_err(), ErrorKind::NotFound);
    assert_eq!(t.access(missing, libc::F_OK).unwrap_err(), ErrorKind::NotFound);
    assert_eq!(
        t.rename(missing, Path::new("/other")).unwrap_err(),
        ErrorKind::NotFound
    );
}

#[test]
fn path_through_a_file_reports_enotdir() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("plain"), b"x").unwrap();
    assert_eq!(
        t.getattr(Path::new("/plain/child")).unwrap_err(),
        ErrorKind::NotADirectory
    );
}

#[test]
fn creation_conflicts_report_eexist() {
    let (dir, t) = scratch();
    fs::create_dir(dir.path().join("d")).unwrap();
    fs::write(dir.path().join("f"), b"").unwrap();
    assert_eq!(t.mkdir(Path::new("/d"), 0o755).unwrap_err(), ErrorKind::Exists);
    assert_eq!(
        t.mknod(Path::new("/f"), libc::S_IFREG | 0o644, 0).unwrap_err(),
        ErrorKind::Exists
    );
}

#[test]
fn removing_a_populated_directory_reports_enotempty() {
    let (dir, t) = scratch();
    fs::create_dir(dir.path().join("d")).unwrap();
    fs::write(dir.path().join("d/f"), b"").unwrap();
    assert_eq!(t.rmdir(Path::new("/d")).unwrap_err(), ErrorKind::NotEmpty);
}

#[test]
fn readlink_on_regular_file_reports_einval() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"").unwrap();
    assert_eq!(t.readlink(Path::new("/f")).unwrap_err(), ErrorKind::InvalidArgument);
}

#[test]
fn opening_a_directory_for_writing_reports_eisdir() {
    let (dir, t) = scratch();
    fs::create_dir(dir.path().join("d")).unwrap();
    assert_eq!(
        t.open(Path::new("/d"), libc::O_WRONLY).unwrap_err(),
        ErrorKind::IsADirectory
    );
}

#[test]
fn dispatch_surfaces_errors_unchanged() {
    let (_dir, t) = scratch();
    let err = t
        .dispatch(Operation::GetAttr {
            path: Path::new("/absent"),
        })
        .unwrap_err();
    assert_eq!(err.to_wire(), -libc::ENOENT);
}

// ── Confinement ──────────────────────────────────────────────────────

#[test]
fn parent_components_never_leave_the_root() {
    let (dir, t) = scratch();
    fs::create_dir(dir.path().join("etc")).unwrap();
    fs::write(dir.path().join("etc/passwd"), b"inside").unwrap();

    let attr = t.getattr(Path::new("/../../etc/passwd")).expect("getattr");
    assert_eq!(attr.size, 6);
    assert_eq!(
        t.resolve(Path::new("/../../etc/passwd")),
        dir.path().join("etc/passwd")
    );
}

#[test]
fn readme_resolves_inside_the_source_tree() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("readme.txt"), b"hello").unwrap();
    let reply = t
        .dispatch(Operation::GetAttr {
            path: Path::new("/readme.txt"),
        })
        .unwrap();
    let Reply::Attr(attr) = reply else {
        panic!("expected attributes, got {reply:?}");
    };
    assert_eq!(attr.kind(), EntryKind::RegularFile);
    assert_eq!(attr.ino, fs::metadata(dir.path().join("readme.txt")).unwrap().ino());
}

// ── Positioned I/O ───────────────────────────────────────────────────

#[test]
fn read_past_end_of_file_is_empty() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"0123456789").unwrap();
    assert!(t.read(Path::new("/f"), 10, 64).unwrap().is_empty());
    assert!(t.read(Path::new("/f"), 1_000, 64).unwrap().is_empty());
}

#[test]
fn read_returns_the_requested_region() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"0123456789").unwrap();
    assert_eq!(t.read(Path::new("/f"), 3, 4).unwrap(), b"3456");
    assert_eq!(t.read(Path::new("/f"), 8, 64).unwrap(), b"89");
}

#[test]
fn write_at_offset_reports_count_and_leaves_rest() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"aaaaaaaa").unwrap();
    let n = t.write(Path::new("/f"), 2, b"XYZ").unwrap();
    assert_eq!(n, 3);
    assert_eq!(fs::read(dir.path().join("f")).unwrap(), b"aaXYZaaa");
}

#[test]
fn negative_offset_is_rejected() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"abc").unwrap();
    assert_eq!(t.read(Path::new("/f"), -1, 1).unwrap_err(), ErrorKind::InvalidArgument);
}

// ── Node creation ────────────────────────────────────────────────────

#[test]
fn mknod_creates_regular_file_with_mode() {
    let (dir, t) = scratch();
    t.mknod(Path::new("/new"), libc::S_IFREG | 0o640, 0).unwrap();
    let meta = fs::metadata(dir.path().join("new")).unwrap();
    assert!(meta.is_file());
    assert_eq!(meta.len(), 0);
    assert_eq!(meta.permissions().mode() & 0o777, 0o640 & !current_umask());
}

#[test]
fn mknod_creates_named_pipe() {
    let (_dir, t) = scratch();
    t.mknod(Path::new("/pipe"), libc::S_IFIFO | 0o600, 0).unwrap();
    assert_eq!(t.getattr(Path::new("/pipe")).unwrap().kind(), EntryKind::NamedPipe);
}

fn current_umask() -> u32 {
    let dir = tempfile::tempdir().unwrap();
    let probe = dir.path().join("probe");
    fs::create_dir(&probe).unwrap();
    !fs::metadata(&probe).unwrap().permissions().mode() & 0o777
}

// ── Directory listing ────────────────────────────────────────────────

#[test]
fn readdir_reports_names_and_types_without_stat() {
    let (dir, t) = scratch();
    fs::create_dir(dir.path().join("sub")).unwrap();
    fs::write(dir.path().join("file"), b"").unwrap();
    std::os::unix::fs::symlink("file", dir.path().join("link")).unwrap();

    let entries = list(&t, "/", 0);
    let mut names: Vec<OsString> = entries.iter().map(|e| e.name.clone()).collect();
    names.sort();
    assert_eq!(names, [".", "..", "file", "link", "sub"].map(OsString::from));

    let kind = |name: &str| entries.iter().find(|e| e.name == name).unwrap().kind;
    assert!(matches!(kind("sub"), EntryKind::Directory | EntryKind::Unknown));
    assert!(matches!(kind("link"), EntryKind::Symlink | EntryKind::Unknown));
}

#[test]
fn readdir_offsets_resume_after_consumed_entries() {
    let (dir, t) = scratch();
    for name in ["a", "b", "c", "d"] {
        fs::write(dir.path().join(name), b"").unwrap();
    }
    let all = list(&t, "/", 0);
    assert_eq!(all.len(), 6);
    for (i, entry) in all.iter().enumerate() {
        assert_eq!(entry.next_offset, i64::try_from(i + 1).unwrap());
    }

    let rest = list(&t, "/", 2);
    assert_eq!(rest, all[2..]);
}

#[test]
fn readdir_stops_when_consumer_is_full() {
    let (dir, t) = scratch();
    for name in ["a", "b", "c"] {
        fs::write(dir.path().join(name), b"").unwrap();
    }
    let mut taken = 0;
    t.readdir(Path::new("/"), 0, &mut |_| {
        taken += 1;
        taken == 2
    })
    .unwrap();
    assert_eq!(taken, 2);
}

#[test]
fn readdir_on_file_reports_enotdir() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"").unwrap();
    let err = t.readdir(Path::new("/f"), 0, &mut |_| false).unwrap_err();
    assert_eq!(err, ErrorKind::NotADirectory);
}

// ── Namespace changes ────────────────────────────────────────────────

#[test]
fn symlink_stores_target_verbatim() {
    let (dir, t) = scratch();
    t.symlink(Path::new("../../outside"), Path::new("/ln")).unwrap();
    assert_eq!(
        fs::read_link(dir.path().join("ln")).unwrap(),
        Path::new("../../outside")
    );
    assert_eq!(t.readlink(Path::new("/ln")).unwrap(), "../../outside");
}

#[test]
fn rename_and_link_move_content() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("a"), b"data").unwrap();
    t.rename(Path::new("/a"), Path::new("/b")).unwrap();
    assert!(!dir.path().join("a").exists());
    t.link(Path::new("/b"), Path::new("/c")).unwrap();
    assert_eq!(t.getattr(Path::new("/c")).unwrap().nlink, 2);
    assert_eq!(fs::read(dir.path().join("c")).unwrap(), b"data");
}

#[test]
fn chown_acts_on_the_link_itself() {
    let (dir, t) = scratch();
    std::os::unix::fs::symlink("missing-target", dir.path().join("dangling")).unwrap();
    let uid = nix::unistd::getuid().as_raw();
    let gid = nix::unistd::getgid().as_raw();
    // following the link would fail with ENOENT
    t.chown(Path::new("/dangling"), Some(uid), Some(gid)).unwrap();
    assert_eq!(t.chown(Path::new("/dangling"), None, None), Ok(()));
}

// ── Attribute updates ────────────────────────────────────────────────

#[test]
fn chmod_truncate_and_utime_apply() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"0123456789").unwrap();
    let f = Path::new("/f");

    t.chmod(f, 0o600).unwrap();
    t.truncate(f, 4).unwrap();
    let at = UNIX_EPOCH + Duration::from_secs(1_000_000);
    t.utime(f, Timestamp::Omit, Timestamp::At(at)).unwrap();

    let attr = t.getattr(f).unwrap();
    assert_eq!(attr.permissions(), 0o600);
    assert_eq!(attr.size, 4);
    assert_eq!(attr.mtime, at);
}

#[test]
fn statfs_reports_filesystem_geometry() {
    let (_dir, t) = scratch();
    let st = t.statfs(Path::new("/")).unwrap();
    assert!(st.block_size > 0);
    assert!(st.name_max > 0);
    assert!(st.blocks_available <= st.blocks_free);
}

#[test]
fn release_and_sync_are_noops() {
    let (_dir, t) = scratch();
    let missing = Path::new("/whatever");
    assert_eq!(t.dispatch(Operation::Release { path: missing }), Ok(Reply::Done));
    assert_eq!(
        t.dispatch(Operation::Sync {
            path: missing,
            datasync: true,
        }),
        Ok(Reply::Done)
    );
}

// ── Extended attributes ──────────────────────────────────────────────

#[cfg(feature = "xattr")]
#[test]
fn absent_xattr_reports_missing_or_unsupported() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"").unwrap();
    let err = t
        .dispatch(Operation::GetXattr {
            path: Path::new("/f"),
            name: std::ffi::OsStr::new("user.absent"),
            size: 0,
        })
        .unwrap_err();
    assert!(matches!(err, ErrorKind::NoData | ErrorKind::NotSupported));
}

#[cfg(feature = "xattr")]
#[test]
fn xattr_size_query_returns_length() {
    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"").unwrap();
    match t.dispatch(Operation::ListXattr {
        path: Path::new("/f"),
        size: 0,
    }) {
        Ok(Reply::XattrSize(_)) | Err(ErrorKind::NotSupported) => {}
        other => panic!("unexpected reply {other:?}"),
    }
}

#[cfg(feature = "xattr")]
#[test]
fn xattr_set_get_list_remove() {
    use std::ffi::OsStr;

    let (dir, t) = scratch();
    fs::write(dir.path().join("f"), b"").unwrap();
    let path = Path::new("/f");
    let name = OsStr::new("user.k");

    let set = t.dispatch(Operation::SetXattr {
        path,
        name,
        value: b"v1",
        flags: 0,
    });
    if set == Err(ErrorKind::NotSupported) {
        return;
    }
    assert_eq!(set, Ok(Reply::Done));

    assert_eq!(
        t.dispatch(Operation::GetXattr { path, name, size: 0 }),
        Ok(Reply::XattrSize(2))
    );
    assert_eq!(
        t.dispatch(Operation::GetXattr { path, name, size: 64 }),
        Ok(Reply::XattrData(b"v1".to_vec()))
    );
    assert_eq!(
        t.dispatch(Operation::GetXattr { path, name, size: 1 }),
        Err(ErrorKind::Range)
    );
    assert_eq!(
        t.dispatch(Operation::ListXattr { path, size: 64 }),
        Ok(Reply::XattrData(b"user.k\0".to_vec()))
    );

    assert_eq!(t.dispatch(Operation::RemoveXattr { path, name }), Ok(Reply::Done));
    assert_eq!(
        t.dispatch(Operation::GetXattr { path, name, size: 0 }),
        Err(ErrorKind::NoData)
    );
}
