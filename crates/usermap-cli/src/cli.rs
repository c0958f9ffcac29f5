//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;
use usermap_common::config::UsermapConfig;

/// usermap: serve one user's home tree under that user's identity.
#[derive(Parser, Debug)]
#[command(name = "usermap", version, about, long_about = None)]
pub struct Cli {
    /// Absolute source directory, or the name of the user whose home
    /// directory is served.
    pub source: String,

    /// Directory to mount the filesystem on.
    pub mountpoint: PathBuf,

    /// Debug output on standard error; implies -f.
    #[arg(short = 'd')]
    pub debug: bool,

    /// Stay in the foreground.
    #[arg(short = 'f')]
    pub foreground: bool,

    /// Do not register the mount in the mount table.
    #[arg(short = 'n')]
    pub no_mtab: bool,

    /// Ignore mount options the filesystem layer does not understand.
    #[arg(short = 's')]
    pub sloppy: bool,

    /// Mount options: rw, source_user=NAME, source_group=NAME, user=NAME,
    /// group=NAME, or anything the mount layer accepts.
    #[arg(short = 'o', value_name = "OPT[,OPT...]")]
    pub options: Vec<String>,
}

impl Cli {
    /// Converts the parsed arguments into a launch configuration.
    #[must_use]
    pub fn into_config(self) -> UsermapConfig {
        UsermapConfig {
            source: self.source,
            mountpoint: self.mountpoint,
            options: self.options,
            debug: self.debug,
            foreground: self.foreground,
            no_mtab: self.no_mtab,
            sloppy: self.sloppy,
        }
    }
}
