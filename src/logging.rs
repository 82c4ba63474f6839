//! Tracing subscriber bootstrap for hosts and tests.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"gl_filter_chain=debug"`).
///
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .with_target(true)
        .with_level(true)
        .try_init()
        .is_ok()
}
