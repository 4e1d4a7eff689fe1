//! Process-wide tracing setup.
//!
//! Follows the teacher's pattern of a single `tracing_subscriber::fmt`
//! layer driven by `RUST_LOG` via `EnvFilter`, defaulting to `info` when the
//! variable is unset so a freshly installed agent is not silent by default.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Installs the global subscriber. Panics if called twice in the same
/// process: `main` is the only legitimate caller.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
