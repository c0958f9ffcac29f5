//! POSIX error conditions returned by filesystem operations.
//!
//! Every local call failure maps to exactly one [`ErrorKind`]. The
//! negative-integer convention of the kernel protocol only appears at the
//! boundary, through [`ErrorKind::to_wire`].

use std::fmt;
use std::io;

use thiserror::Error;

/// A POSIX error condition, mirroring `errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// `EPERM`
    #[error("operation not permitted")]
    NotPermitted,
    /// `ENOENT`
    #[error("no such file or directory")]
    NotFound,
    /// `EINTR`
    #[error("interrupted system call")]
    Interrupted,
    /// `EIO`
    #[error("input/output error")]
    Io,
    /// `ENXIO`
    #[error("no such device or address")]
    NoSuchDeviceOrAddress,
    /// `EBADF`
    #[error("bad file descriptor")]
    BadDescriptor,
    /// `EAGAIN`
    #[error("resource temporarily unavailable")]
    WouldBlock,
    /// `ENOMEM`
    #[error("out of memory")]
    OutOfMemory,
    /// `EACCES`
    #[error("permission denied")]
    PermissionDenied,
    /// `EBUSY`
    #[error("device or resource busy")]
    Busy,
    /// `EEXIST`
    #[error("file exists")]
    Exists,
    /// `EXDEV`
    #[error("invalid cross-device link")]
    CrossDevice,
    /// `ENODEV`
    #[error("no such device")]
    NoSuchDevice,
    /// `ENOTDIR`
    #[error("not a directory")]
    NotADirectory,
    /// `EISDIR`
    #[error("is a directory")]
    IsADirectory,
    /// `EINVAL`
    #[error("invalid argument")]
    InvalidArgument,
    /// `EMFILE`
    #[error("too many open files")]
    TooManyOpenFiles,
    /// `ETXTBSY`
    #[error("text file busy")]
    TextBusy,
    /// `EFBIG`
    #[error("file too large")]
    FileTooLarge,
    /// `ENOSPC`
    #[error("no space left on device")]
    NoSpace,
    /// `EROFS`
    #[error("read-only file system")]
    ReadOnly,
    /// `EMLINK`
    #[error("too many links")]
    TooManyLinks,
    /// `ERANGE`
    #[error("result out of range")]
    Range,
    /// `ENAMETOOLONG`
    #[error("file name too long")]
    NameTooLong,
    /// `ENOSYS`
    #[error("function not implemented")]
    NotImplemented,
    /// `ENOTEMPTY`
    #[error("directory not empty")]
    NotEmpty,
    /// `ELOOP`
    #[error("too many levels of symbolic links")]
    SymlinkLoop,
    /// `ENODATA`
    #[error("no data available")]
    NoData,
    /// `ENOTSUP`
    #[error("operation not supported")]
    NotSupported,
    /// `EDQUOT`
    #[error("disk quota exceeded")]
    QuotaExceeded,
    /// Any other `errno`, carried as-is.
    #[error("os error {0}")]
    Other(i32),
}

impl ErrorKind {
    /// Maps a raw positive `errno`.
    #[must_use]
    pub const fn from_errno(errno: i32) -> Self {
        match errno {
            libc::EPERM => Self::NotPermitted,
            libc::ENOENT => Self::NotFound,
            libc::EINTR => Self::Interrupted,
            libc::EIO => Self::Io,
            libc::ENXIO => Self::NoSuchDeviceOrAddress,
            libc::EBADF => Self::BadDescriptor,
            libc::EAGAIN => Self::WouldBlock,
            libc::ENOMEM => Self::OutOfMemory,
            libc::EACCES => Self::PermissionDenied,
            libc::EBUSY => Self::Busy,
            libc::EEXIST => Self::Exists,
            libc::EXDEV => Self::CrossDevice,
            libc::ENODEV => Self::NoSuchDevice,
            libc::ENOTDIR => Self::NotADirectory,
            libc::EISDIR => Self::IsADirectory,
            libc::EINVAL => Self::InvalidArgument,
            libc::EMFILE => Self::TooManyOpenFiles,
            libc::ETXTBSY => Self::TextBusy,
            libc::EFBIG => Self::FileTooLarge,
            libc::ENOSPC => Self::NoSpace,
            libc::EROFS => Self::ReadOnly,
            libc::EMLINK => Self::TooManyLinks,
            libc::ERANGE => Self::Range,
            libc::ENAMETOOLONG => Self::NameTooLong,
            libc::ENOSYS => Self::NotImplemented,
            libc::ENOTEMPTY => Self::NotEmpty,
            libc::ELOOP => Self::SymlinkLoop,
            libc::ENODATA => Self::NoData,
            libc::ENOTSUP => Self::NotSupported,
            libc::EDQUOT => Self::QuotaExceeded,
            other => Self::Other(other),
        }
    }

    /// The positive `errno` for this condition.
    #[must_use]
    pub const fn errno(self) -> i32 {
        match self {
            Self::NotPermitted => libc::EPERM,
            Self::NotFound => libc::ENOENT,
            Self::Interrupted => libc::EINTR,
            Self::Io => libc::EIO,
            Self::NoSuchDeviceOrAddress => libc::ENXIO,
            Self::BadDescriptor => libc::EBADF,
            Self::WouldBlock => libc::EAGAIN,
            Self::OutOfMemory => libc::ENOMEM,
            Self::PermissionDenied => libc::EACCES,
            Self::Busy => libc::EBUSY,
            Self::Exists => libc::EEXIST,
            Self::CrossDevice => libc::EXDEV,
            Self::NoSuchDevice => libc::ENODEV,
            Self::NotADirectory => libc::ENOTDIR,
            Self::IsADirectory => libc::EISDIR,
            Self::InvalidArgument => libc::EINVAL,
            Self::TooManyOpenFiles => libc::EMFILE,
            Self::TextBusy => libc::ETXTBSY,
            Self::FileTooLarge => libc::EFBIG,
            Self::NoSpace => libc::ENOSPC,
            Self::ReadOnly => libc::EROFS,
            Self::TooManyLinks => libc::EMLINK,
            Self::Range => libc::ERANGE,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::NotImplemented => libc::ENOSYS,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::SymlinkLoop => libc::ELOOP,
            Self::NoData => libc::ENODATA,
            Self::NotSupported => libc::ENOTSUP,
            Self::QuotaExceeded => libc::EDQUOT,
            Self::Other(errno) => errno,
        }
    }

    /// The negated code handed to the kernel protocol.
    #[must_use]
    pub const fn to_wire(self) -> i32 {
        -self.errno()
    }

    /// The condition left in `errno` by the last failed libc call.
    #[must_use]
    pub fn last_os_error() -> Self {
        Self::from(&io::Error::last_os_error())
    }
}

impl From<nix::Error> for ErrorKind {
    fn from(err: nix::Error) -> Self {
        Self::from_errno(err as i32)
    }
}

impl From<&io::Error> for ErrorKind {
    fn from(err: &io::Error) -> Self {
        err.raw_os_error().map_or(Self::Io, Self::from_errno)
    }
}

impl From<io::Error> for ErrorKind {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}

/// Result of one filesystem operation.
pub type OpResult<T> = std::result::Result<T, ErrorKind>;

/// Display adaptor printing the symbolic name and code, e.g. `ENOENT(2)`.
pub struct Code(pub ErrorKind);

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.0.errno())
    }
}
