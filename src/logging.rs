use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "hms_notify=debug,info";

/// Install the global `tracing` subscriber, reading `RUST_LOG` when set.
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
