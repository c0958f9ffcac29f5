//! # usermap-core
//!
//! Startup half of the usermap filesystem server.
//!
//! - **Options**: splits a raw mount option string into the recognized
//!   identity keys and an opaque passthrough set.
//! - **Identity**: resolves the source user, group and directory, plus the
//!   optional mount-visible owner override.
//! - **Containment**: the irreversible, strictly ordered sequence that
//!   confines the process to the source directory and permanently assumes
//!   the source identity.
//!
//! Privileged system calls go through the [`containment::PrivilegeOps`]
//! trait so the sequence can be observed without root.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod containment;
pub mod directory;
pub mod identity;
pub mod options;
