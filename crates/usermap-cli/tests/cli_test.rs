//! Exercises the `usermap` binary up to the point where it would need
//! privilege: every case here fails (or exits) before mounting.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::process::{Command, Output};

fn usermap(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_usermap"))
        .args(args)
        .env("RUST_LOG", "debug")
        .output()
        .expect("spawn usermap")
}

#[test]
fn help_exits_zero() {
    let out = usermap(&["--help"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("MOUNTPOINT"));
}

#[test]
fn missing_mountpoint_exits_one() {
    let out = usermap(&["alice"]);
    assert_eq!(out.status.code(), Some(1));
}

#[test]
fn unknown_user_exits_one_before_mounting() {
    let mnt = tempfile::tempdir().unwrap();
    let out = usermap(&[
        "-d",
        "no-such-user-usermap-test",
        mnt.path().to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    let text = String::from_utf8_lossy(&out.stderr);
    assert!(text.contains("no-such-user-usermap-test"), "stderr: {text}");
}

#[test]
fn path_source_without_source_user_exits_one() {
    let src = tempfile::tempdir().unwrap();
    let mnt = tempfile::tempdir().unwrap();
    let out = usermap(&[
        "-d",
        src.path().to_str().unwrap(),
        mnt.path().to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    let text = String::from_utf8_lossy(&out.stderr);
    assert!(text.contains("source_user"), "stderr: {text}");
}

#[test]
fn mismatched_source_user_exits_one() {
    let mnt = tempfile::tempdir().unwrap();
    let out = usermap(&[
        "-d",
        "-o",
        "source_user=nobody",
        "root",
        mnt.path().to_str().unwrap(),
    ]);
    assert_eq!(out.status.code(), Some(1));
    let text = String::from_utf8_lossy(&out.stderr);
    assert!(text.contains("does not match"), "stderr: {text}");
}
