//! tracing-subscriber setup for the command-line binary

use crate::config::LogFormat;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Pick the default level from the configured name and the quiet/verbose flags
pub fn default_level(configured: &str, quiet: bool, verbose: bool) -> Level {
    if quiet {
        return Level::WARN;
    }
    if verbose {
        return Level::DEBUG;
    }
    configured.parse().unwrap_or(Level::INFO)
}

/// Install the global subscriber; `RUST_LOG` takes precedence over `level`
pub fn init_logging(level: Level, format: LogFormat) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // Ignored when a global subscriber is already installed
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
