//! Log subscriber setup.
//!
//! Debug runs log to standard error. Otherwise every formatted event is
//! handed to `syslog(3)` under the `usermap` ident with the daemon
//! facility, so a detached server still leaves a trail.

use std::ffi::CStr;
use std::io;

use anyhow::Context;
use syslog_tracing::{Facility, Options, Syslog};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const IDENT: &CStr = c"usermap";

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over the default level, which is `debug` with `-d`
/// and `info` otherwise.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the
/// system logger connection is already taken.
pub fn init(debug: bool) -> anyhow::Result<()> {
    let default = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default.as_str().to_ascii_lowercase()));

    if debug {
        let layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
        tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(open_syslog()?)
            .with_ansi(false)
            .without_time()
            .with_target(false)
            .with_level(false);
        tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    }
    Ok(())
}

/// Connects to the system logger under the `usermap` ident.
///
/// The socket is opened now: /dev/log is out of reach after chroot.
fn open_syslog() -> anyhow::Result<Syslog> {
    let options = Options::LOG_PID | Options::LOG_NDELAY;
    Syslog::new(IDENT, options, Facility::Daemon).context("system logger connection already in use")
}

#[cfg(test)]
mod tests {
    use usermap_common::constants::SYSLOG_IDENT;

    use super::*;

    #[test]
    fn ident_matches_configured_name() {
        assert_eq!(IDENT.to_str().unwrap(), SYSLOG_IDENT);
    }
}
