//! Tracing subscriber setup for hosts that don't install their own.

use tracing_subscriber::EnvFilter;

/// Default directive when neither `RUST_LOG` nor an explicit filter is set.
pub const DEFAULT_FILTER: &str = "ihub_loyalty=info";

/// Install a fmt subscriber. `RUST_LOG` wins over `filter`, which wins over
/// [`DEFAULT_FILTER`]. Returns `false` if a global subscriber was already
/// set; calling this more than once is harmless.
pub fn init(filter: Option<&str>) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter.unwrap_or(DEFAULT_FILTER)))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
