//! Logging setup for the node process
//!
//! A single `tracing-subscriber` entry point every binary calls once at
//! startup, rather than each process wiring its own formatter and filter.

pub use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber that logs to stdout
///
/// `default_level` is used when the `RUST_LOG` environment variable is
/// unset, so operators can always override verbosity without a rebuild.
pub fn setup_system_logger(default_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    // A second call (e.g. in tests that build multiple nodes in one
    // process) is expected and harmless; only the first wins.
    let _ = tracing::subscriber::set_global_default(subscriber);
}
