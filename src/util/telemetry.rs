//! Structured logging setup.
//!
//! Scheduler components log through `tracing` with `unit` and `queue`
//! fields; audit records use the `kube_queue::audit` target.

use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "kube_queue=info";

/// Install a fmt subscriber filtered by `RUST_LOG`, or by
/// [`DEFAULT_LOG_FILTER`] when unset. No-op if a subscriber is installed.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Like [`init_tracing`] with a caller supplied fallback filter.
pub fn init_tracing_with(fallback: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
