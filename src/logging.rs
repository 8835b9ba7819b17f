//! Diagnostics setup for the `launchrank` binary.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.
//! `LAUNCHRANK_LOG` takes an [`EnvFilter`] directive and wins over `-v`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "LAUNCHRANK_LOG";

/// Filter directive for a `-v` count.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "launchrank=info,warn",
        2 => "launchrank=debug,info",
        _ => "trace",
    }
}

/// Install the global subscriber. Calling it twice is harmless; the second
/// call leaves the first subscriber in place.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
