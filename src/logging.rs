//! Subscriber setup for binaries and tests. The library itself only emits
//! `tracing` events and never installs a subscriber.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a compact stderr subscriber at `level`; `RUST_LOG` wins when set.
///
/// Calling this more than once is a no-op.
pub fn init_subscriber(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::init_subscriber;

    #[test]
    fn repeated_initialization_is_harmless() {
        init_subscriber("debug");
        init_subscriber("not a level [");
        tracing::debug!("subscriber installed");
    }
}
