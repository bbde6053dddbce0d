//! Tracing subscriber setup shared by every scheduler role.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `level` seeds the filter (typically `Settings.log.level`); a `RUST_LOG`
/// environment variable takes precedence. Calling this more than once is
/// harmless; later calls are ignored.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
