//! Process-wide tracing setup for the binaries.

use tracing_subscriber::EnvFilter;

/// Install the console subscriber. `RUST_LOG` wins over `default_level`;
/// `verbose` lowers the default to `debug`. Calling twice is harmless.
pub fn init(default_level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { default_level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
