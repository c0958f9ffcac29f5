//! System-wide constants.

use std::time::Duration;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "usermap";

/// Identifier passed to `openlog(3)` when logging to syslog.
pub const SYSLOG_IDENT: &str = "usermap";

/// Filesystem subtype reported in the mount table unless overridden.
pub const FS_SUBTYPE: &str = "usermap";

/// Lifetime the kernel may keep entries and attributes.
///
/// Zero: every request reaches the filesystem so the source user's
/// permission checks always apply.
pub const ATTR_TTL: Duration = Duration::ZERO;

/// Option token dropped on sight (inserted by autofs).
pub const OPT_RW: &str = "rw";

/// Option key naming the user whose identity is assumed.
pub const OPT_SOURCE_USER: &str = "source_user=";

/// Option key overriding the group whose identity is assumed.
pub const OPT_SOURCE_GROUP: &str = "source_group=";

/// Option key naming the user the mount presents files as.
pub const OPT_USER: &str = "user=";

/// Option key naming the group the mount presents files as.
pub const OPT_GROUP: &str = "group=";

/// Separator between tokens of a mount option string.
pub const OPTION_SEPARATOR: char = ',';
