//! Extended attribute passthrough.
//!
//! All four calls operate on the node itself (`l*xattr`), never a symlink's
//! target. A zero `size` on get and list is a size query.

#![allow(unsafe_code)]

use std::ffi::{CString, OsStr};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::errno::{ErrorKind, OpResult};
use crate::operation::Reply;

fn c_string(bytes: &[u8]) -> OpResult<CString> {
    CString::new(bytes).map_err(|_| ErrorKind::InvalidArgument)
}

fn checked(ret: libc::ssize_t) -> OpResult<usize> {
    usize::try_from(ret).map_err(|_| ErrorKind::last_os_error())
}

fn sized(len: usize) -> OpResult<Reply> {
    u32::try_from(len)
        .map(Reply::XattrSize)
        .map_err(|_| ErrorKind::Range)
}

/// Reads attribute `name`, or its length when `size` is zero.
///
/// # Errors
///
/// Returns the `lgetxattr(2)` error, `ERANGE` when `size` is too small.
pub fn get(path: &Path, name: &OsStr, size: u32) -> OpResult<Reply> {
    let c_path = c_string(path.as_os_str().as_bytes())?;
    let c_name = c_string(name.as_bytes())?;
    if size == 0 {
        // SAFETY: both strings are NUL-terminated and a null buffer with
        // length zero asks only for the value size.
        let ret = unsafe {
            libc::lgetxattr(c_path.as_ptr(), c_name.as_ptr(), std::ptr::null_mut(), 0)
        };
        return sized(checked(ret)?);
    }
    let mut buf = vec![0_u8; size as usize];
    // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
    let ret = unsafe {
        libc::lgetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            buf.as_mut_ptr().cast(),
            buf.len(),
        )
    };
    let n = checked(ret)?;
    buf.truncate(n);
    Ok(Reply::XattrData(buf))
}

/// Sets attribute `name` to `value`.
///
/// # Errors
///
/// Returns the `lsetxattr(2)` error.
pub fn set(path: &Path, name: &OsStr, value: &[u8], flags: i32) -> OpResult<()> {
    let c_path = c_string(path.as_os_str().as_bytes())?;
    let c_name = c_string(name.as_bytes())?;
    // SAFETY: `value` is valid for reads of `value.len()` bytes.
    let ret = unsafe {
        libc::lsetxattr(
            c_path.as_ptr(),
            c_name.as_ptr(),
            value.as_ptr().cast(),
            value.len(),
            flags,
        )
    };
    if ret == 0 {
        Ok(())
    } else {
        Err(ErrorKind::last_os_error())
    }
}

/// Lists attribute names as a NUL-separated buffer, or its length when
/// `size` is zero.
///
/// # Errors
///
/// Returns the `llistxattr(2)` error, `ERANGE` when `size` is too small.
pub fn list(path: &Path, size: u32) -> OpResult<Reply> {
    let c_path = c_string(path.as_os_str().as_bytes())?;
    if size == 0 {
        // SAFETY: a null buffer with length zero asks only for the size.
        let ret = unsafe { libc::llistxattr(c_path.as_ptr(), std::ptr::null_mut(), 0) };
        return sized(checked(ret)?);
    }
    let mut buf = vec![0_u8; size as usize];
    // SAFETY: `buf` is valid for writes of `buf.len()` bytes.
    let ret = unsafe { libc::llistxattr(c_path.as_ptr(), buf.as_mut_ptr().cast(), buf.len()) };
    let n = checked(ret)?;
    buf.truncate(n);
    Ok(Reply::XattrData(buf))
}

/// Removes attribute `name`.
///
/// # Errors
///
/// Returns the `lremovexattr(2)` error.
pub fn remove(path: &Path, name: &OsStr) -> OpResult<()> {
    let c_path = c_string(path.as_os_str().as_bytes())?;
    let c_name = c_string(name.as_bytes())?;
    // SAFETY: both strings are NUL-terminated and outlive the call.
    let ret = unsafe { libc::lremovexattr(c_path.as_ptr(), c_name.as_ptr()) };
    if ret == 0 {
        Ok(())
    } else {
        Err(ErrorKind::last_os_error())
    }
}
