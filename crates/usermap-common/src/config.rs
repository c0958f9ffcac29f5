//! Launch configuration for a single usermap mount.

use std::path::PathBuf;

use crate::constants::OPTION_SEPARATOR;

/// Everything the command line says about one mount.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsermapConfig {
    /// Source identifier: an absolute directory path or a bare username.
    pub source: String,
    /// Directory the filesystem is mounted on.
    pub mountpoint: PathBuf,
    /// Raw `-o` values in the order they were given.
    pub options: Vec<String>,
    /// Debug output on standard error; implies `foreground`.
    pub debug: bool,
    /// Stay attached to the terminal instead of daemonizing.
    pub foreground: bool,
    /// Skip mount-table registration.
    pub no_mtab: bool,
    /// Drop unrecognized mount options instead of failing.
    pub sloppy: bool,
}

impl UsermapConfig {
    /// Merges every `-o` value into one comma-separated option string.
    #[must_use]
    pub fn merged_options(&self) -> String {
        self.options
            .iter()
            .filter(|opt| !opt.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&OPTION_SEPARATOR.to_string())
    }

    /// Whether the process should stay in the foreground.
    #[must_use]
    pub const fn stays_in_foreground(&self) -> bool {
        self.debug || self.foreground
    }
}
