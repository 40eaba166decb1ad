//! Tracing setup for binaries embedding the client.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the fmt subscriber, filtered by `RUST_LOG`.
///
/// Falls back to debug output for this crate when `RUST_LOG` is unset.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitsync_client=debug,fitsync_agent=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
