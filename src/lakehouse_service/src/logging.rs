//! Process-wide `tracing` initialization (SPEC_FULL.md §3 "Logging"),
//! mirroring `moonlink_backend::logging`: an env-filter defaulting to `info`,
//! initialized once at service start.

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Safe to call more than once per
/// process (subsequent calls are no-ops); intended to be called exactly once
/// from `main`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
