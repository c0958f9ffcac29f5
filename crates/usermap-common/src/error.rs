//! Startup error types for the usermap workspace.
//!
//! Everything in here is fatal: identity resolution, mount establishment
//! and privilege containment either succeed completely or the process
//! exits. Errors raised while serving individual filesystem operations
//! live in `usermap-fs` and never terminate the session.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level startup error shared across the workspace.
#[derive(Debug, Error)]
pub enum UsermapError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A user name is not present in the system identity directory.
    #[error("User '{name}' is not known.")]
    UnknownUser {
        /// Name that failed to resolve.
        name: String,
    },

    /// A group name is not present in the system group directory.
    #[error("Group '{name}' is not known.")]
    UnknownGroup {
        /// Name that failed to resolve.
        name: String,
    },

    /// The positional source names a different user than `source_user=`.
    #[error("source_user '{option}' does not match source '{source_name}'")]
    IdentityMismatch {
        /// Username given positionally.
        source_name: String,
        /// Username given through the `source_user=` option.
        option: String,
    },

    /// An absolute source path was given without a `source_user=` option.
    #[error("source '{path}' is a path; a source_user= option is required")]
    MissingSourceUser {
        /// The absolute source path.
        path: PathBuf,
    },

    /// The source directory does not exist.
    #[error("Directory '{path}' does not exist.")]
    SourceMissing {
        /// The missing source path.
        path: PathBuf,
    },

    /// The source path exists but is not a directory.
    #[error("'{path}' is not a directory.")]
    NotADirectory {
        /// The offending source path.
        path: PathBuf,
    },

    /// The identity directory itself could not be queried.
    #[error("identity lookup for '{name}' failed: {source}")]
    Lookup {
        /// Name being looked up.
        name: String,
        /// Underlying error reported by the directory.
        source: std::io::Error,
    },

    /// One step of the privilege containment sequence failed.
    #[error("containment step '{step}' failed: {source}")]
    Containment {
        /// Name of the failed step.
        step: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A mount option could not be forwarded to the FUSE layer.
    #[error("unrecognized mount option '{option}' (use -s to ignore)")]
    InvalidOption {
        /// The offending option token.
        option: String,
    },

    /// The FUSE mount could not be established or served.
    #[error("mount at {mountpoint} failed: {source}")]
    Mount {
        /// Target mountpoint.
        mountpoint: PathBuf,
        /// Underlying error from the FUSE layer.
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, UsermapError>;
