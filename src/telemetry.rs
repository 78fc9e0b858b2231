//! Tracing initialization.

use crate::error::{Error, Result};

/// Initialize the tracing subscriber with an env-filter and fmt output.
///
/// `RUST_LOG` wins when set; otherwise the given default level applies.
///
/// # Errors
///
/// Returns an error if a subscriber was already installed.
pub fn init(default_level: &str) -> Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| Error::Other(format!("failed to init tracing subscriber: {e}")))
}
