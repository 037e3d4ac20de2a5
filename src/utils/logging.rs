//! Logging setup

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install a global subscriber; `RUST_LOG` overrides `level`
///
/// A second call is a no-op.
pub fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(false))
        .with(filter)
        .try_init()
        .ok();
}
