//! # usermap-common
//!
//! Shared error definitions, launch configuration, and constants used
//! across the usermap workspace.
//!
//! This crate is the leaf of the dependency graph. It depends on no other
//! internal crate and provides the primitives that the resolver, the
//! containment bootstrapper, the translator, and the CLI build upon.

pub mod config;
pub mod constants;
pub mod error;
