//! # usermap-fs
//!
//! Serving half of the usermap filesystem server.
//!
//! - **Operations**: the closed set of filesystem operations and their
//!   results ([`operation`]).
//! - **Translator**: executes each operation as the matching local system
//!   call, reporting failures as POSIX [`errno::ErrorKind`]s.
//! - **Adapter**: the `fuser` boundary, mapping kernel node numbers to
//!   paths and results to replies.
//! - **Mount**: option translation and the mounted-but-idle handle that
//!   only starts serving once containment is complete.
//!
//! Extended attributes need the raw `l*xattr` calls; those are wrapped in
//! safe functions with `// SAFETY:` notes and can be compiled out with
//! the `xattr` feature.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod adapter;
pub mod errno;
pub mod inode;
pub mod mount;
pub mod operation;
pub mod translator;
#[cfg(feature = "xattr")]
pub mod xattr;

pub use adapter::{OwnerOverride, UsermapFs};
pub use errno::{ErrorKind, OpResult};
pub use mount::{MountSettings, PendingMount, mount_options};
pub use operation::{Operation, Reply};
pub use translator::Translator;
